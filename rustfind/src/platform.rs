//! Host primitives the walker needs beyond `std::fs`: remote share listing,
//! alternate stream access and drive enumeration.
//!
//! The engine only talks to [`Platform`]; tests swap in fakes.
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

#[cfg(windows)]
mod windows;

/// An alternate data stream attached to a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub name: String,
    pub size: u64,
}

pub trait Platform: Send + Sync {
    /// Lists the disk shares a remote machine exposes
    fn list_shares(&self, machine: &str) -> io::Result<Vec<String>>;

    /// Lists the named alternate streams of a file, excluding the default stream
    fn list_streams(&self, path: &Path) -> io::Result<Vec<StreamInfo>>;

    /// Looks up a single named stream
    fn stream_info(&self, path: &Path, name: &str) -> io::Result<Option<StreamInfo>> {
        Ok(self
            .list_streams(path)?
            .into_iter()
            .find(|s| s.name.eq_ignore_ascii_case(name)))
    }

    /// Opens a file, or one of its alternate streams, for reading
    fn open(&self, path: &Path, stream: Option<&str>) -> io::Result<Box<dyn Read + Send>>;

    /// Roots searched when every drive is requested
    fn drive_roots(&self) -> Vec<PathBuf>;
}

/// The platform backed by the local operating system
#[derive(Debug, Default, Clone, Copy)]
pub struct NativePlatform;

impl NativePlatform {
    #[cfg(windows)]
    fn stream_path(path: &Path, name: &str) -> PathBuf {
        let mut raw = path.as_os_str().to_os_string();
        raw.push(":");
        raw.push(name);
        PathBuf::from(raw)
    }
}

impl Platform for NativePlatform {
    #[cfg(windows)]
    fn list_shares(&self, machine: &str) -> io::Result<Vec<String>> {
        debug!("Enumerating disk shares of {}", machine);
        windows::list_shares(machine)
    }

    #[cfg(not(windows))]
    fn list_shares(&self, machine: &str) -> io::Result<Vec<String>> {
        debug!("Share listing requested for {}", machine);
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("listing shares of {} is not supported on this platform", machine),
        ))
    }

    #[cfg(windows)]
    fn list_streams(&self, path: &Path) -> io::Result<Vec<StreamInfo>> {
        windows::list_streams(path)
    }

    // Only NTFS carries alternate streams
    #[cfg(not(windows))]
    fn list_streams(&self, _path: &Path) -> io::Result<Vec<StreamInfo>> {
        Ok(Vec::new())
    }

    #[cfg(windows)]
    fn stream_info(&self, path: &Path, name: &str) -> io::Result<Option<StreamInfo>> {
        match std::fs::metadata(Self::stream_path(path, name)) {
            Ok(meta) => Ok(Some(StreamInfo {
                name: name.to_string(),
                size: meta.len(),
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[cfg(not(windows))]
    fn stream_info(&self, _path: &Path, _name: &str) -> io::Result<Option<StreamInfo>> {
        Ok(None)
    }

    fn open(&self, path: &Path, stream: Option<&str>) -> io::Result<Box<dyn Read + Send>> {
        match stream {
            None => Ok(Box::new(File::open(path)?)),
            #[cfg(windows)]
            Some(name) => Ok(Box::new(File::open(Self::stream_path(path, name))?)),
            #[cfg(not(windows))]
            Some(name) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("alternate stream {} requires NTFS", name),
            )),
        }
    }

    #[cfg(windows)]
    fn drive_roots(&self) -> Vec<PathBuf> {
        (b'A'..=b'Z')
            .map(|letter| PathBuf::from(format!("{}:/", letter as char)))
            .filter(|root| root.exists())
            .collect()
    }

    #[cfg(not(windows))]
    fn drive_roots(&self) -> Vec<PathBuf> {
        vec![PathBuf::from("/")]
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::HashMap;
    use std::io::Cursor;

    /// In-memory shares and streams layered over the real filesystem
    #[derive(Debug, Default)]
    pub struct FakePlatform {
        pub shares: HashMap<String, Vec<String>>,
        pub streams: HashMap<PathBuf, Vec<(String, String)>>,
    }

    impl Platform for FakePlatform {
        fn list_shares(&self, machine: &str) -> io::Result<Vec<String>> {
            self.shares
                .get(machine)
                .cloned()
                .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
        }

        fn list_streams(&self, path: &Path) -> io::Result<Vec<StreamInfo>> {
            Ok(self
                .streams
                .get(path)
                .map(|streams| {
                    streams
                        .iter()
                        .map(|(name, body)| StreamInfo {
                            name: name.clone(),
                            size: body.len() as u64,
                        })
                        .collect()
                })
                .unwrap_or_default())
        }

        fn open(&self, path: &Path, stream: Option<&str>) -> io::Result<Box<dyn Read + Send>> {
            match stream {
                None => Ok(Box::new(File::open(path)?)),
                Some(name) => self
                    .streams
                    .get(path)
                    .and_then(|streams| streams.iter().find(|(n, _)| n == name))
                    .map(|(_, body)| Box::new(Cursor::new(body.clone().into_bytes())) as Box<dyn Read + Send>)
                    .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound)),
            }
        }

        fn drive_roots(&self) -> Vec<PathBuf> {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakePlatform;
    use super::*;

    #[test]
    fn test_native_drive_roots_exist() {
        let roots = NativePlatform.drive_roots();
        assert!(!roots.is_empty());
        assert!(roots.iter().all(|r| r.exists()));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_native_shares_unsupported() {
        let err = NativePlatform.list_shares("server").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }

    #[test]
    fn test_fake_stream_lookup() {
        let mut platform = FakePlatform::default();
        platform.streams.insert(
            PathBuf::from("/x/a.txt"),
            vec![("Secret".to_string(), "hidden text".to_string())],
        );

        let info = platform
            .stream_info(Path::new("/x/a.txt"), "secret")
            .unwrap()
            .unwrap();
        assert_eq!(info.size, 11);

        let mut body = String::new();
        platform
            .open(Path::new("/x/a.txt"), Some("Secret"))
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "hidden text");
    }
}
