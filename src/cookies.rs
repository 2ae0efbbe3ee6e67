use anyhow::{Context, Error};
use cookie::time::OffsetDateTime;
use cookie::Cookie;
use log::warn;
use std::fs;
use std::path::PathBuf;

/// File-backed stand-in for a browser cookie jar. One `Set-Cookie` style
/// entry per line, serialized and parsed by the `cookie` crate.
pub struct CookieJar {
    path: PathBuf,
}

impl CookieJar {
    pub fn open<P: Into<PathBuf>>(path: P) -> CookieJar {
        CookieJar { path: path.into() }
    }

    /// Jar location in the platform data directory. `None` if the platform
    /// has no notion of one.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|p| p.join("spotifyfollow").join("cookies.txt"))
    }

    /// Returns the named cookie. A cookie whose `Expires` attribute has
    /// passed is treated as absent.
    pub fn get(&self, name: &str) -> Result<Option<Cookie<'static>>, Error> {
        let cookies = self.read_all()?;
        Ok(cookies
            .into_iter()
            .find(|c| c.name() == name && !expired(c)))
    }

    /// Stores a cookie, replacing any existing cookie of the same name.
    pub fn set(&self, cookie: Cookie<'static>) -> Result<(), Error> {
        let mut cookies = self.read_all()?;
        cookies.retain(|c| c.name() != cookie.name());
        cookies.push(cookie);
        self.write_all(&cookies)
    }

    /// Removes the named cookie. Returns whether it existed.
    pub fn delete(&self, name: &str) -> Result<bool, Error> {
        let mut cookies = self.read_all()?;
        let before = cookies.len();
        cookies.retain(|c| c.name() != name);
        if cookies.len() == before {
            return Ok(false);
        }
        self.write_all(&cookies)?;
        Ok(true)
    }

    fn read_all(&self) -> Result<Vec<Cookie<'static>>, Error> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path).context("read cookie jar")?;
        let mut cookies = Vec::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match Cookie::parse(line.to_string()) {
                Ok(c) => cookies.push(c),
                Err(e) => warn!("skipping malformed cookie jar line: {}", e),
            }
        }
        Ok(cookies)
    }

    fn write_all(&self, cookies: &[Cookie<'static>]) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("create cookie jar directory")?;
        }
        let mut buf = String::new();
        for c in cookies {
            buf.push_str(&c.to_string());
            buf.push('\n');
        }
        fs::write(&self.path, buf).context("write cookie jar")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))
                .context("set cookie jar permissions")?;
        }

        Ok(())
    }
}

fn expired(c: &Cookie) -> bool {
    match c.expires_datetime() {
        Some(at) => at <= OffsetDateTime::now_utc(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cookie::time::Duration;
    use tempfile::TempDir;

    fn test_jar() -> (CookieJar, TempDir) {
        let dir = TempDir::new().unwrap();
        let jar = CookieJar::open(dir.path().join("cookies.txt"));
        (jar, dir)
    }

    #[test]
    fn set_then_get() {
        let (jar, _dir) = test_jar();

        jar.set(Cookie::new("session", "abc123")).unwrap();

        let c = jar.get("session").unwrap().unwrap();
        assert_eq!(c.value(), "abc123");
    }

    #[test]
    fn get_missing() {
        let (jar, _dir) = test_jar();

        assert!(jar.get("nope").unwrap().is_none());
    }

    #[test]
    fn set_replaces_same_name() {
        let (jar, _dir) = test_jar();

        jar.set(Cookie::new("session", "old")).unwrap();
        jar.set(Cookie::new("session", "new")).unwrap();

        let c = jar.get("session").unwrap().unwrap();
        assert_eq!(c.value(), "new");
    }

    #[test]
    fn delete_reports_existence() {
        let (jar, _dir) = test_jar();

        jar.set(Cookie::new("session", "abc")).unwrap();

        assert!(jar.delete("session").unwrap());
        assert!(!jar.delete("session").unwrap());
        assert!(jar.get("session").unwrap().is_none());
    }

    #[test]
    fn expired_cookie_is_absent() {
        let (jar, _dir) = test_jar();

        let mut c = Cookie::new("session", "abc");
        c.set_expires(OffsetDateTime::now_utc() - Duration::hours(1));
        jar.set(c).unwrap();

        assert!(jar.get("session").unwrap().is_none());
    }

    #[test]
    fn cookies_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cookies.txt");

        {
            let jar = CookieJar::open(path.clone());
            let mut c = Cookie::new("session", "abc");
            c.set_expires(OffsetDateTime::now_utc() + Duration::days(1));
            jar.set(c).unwrap();
        }

        let jar = CookieJar::open(path);
        let c = jar.get("session").unwrap().unwrap();
        assert_eq!(c.value(), "abc");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let (jar, _dir) = test_jar();

        jar.set(Cookie::new("good", "1")).unwrap();
        let mut contents = fs::read_to_string(&jar.path).unwrap();
        contents.push_str("not a cookie line\n");
        fs::write(&jar.path, contents).unwrap();

        assert!(jar.get("good").unwrap().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn jar_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let (jar, _dir) = test_jar();
        jar.set(Cookie::new("session", "abc")).unwrap();

        let mode = fs::metadata(&jar.path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
