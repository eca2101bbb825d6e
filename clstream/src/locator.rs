use crate::{malformed_locator, StreamError};
use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

pub const SCHEME: &str = "opencl://";

/// 程序文件的形式，由扩展名决定。
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ProgramKind {
    /// 需要编译的源码。
    Source,
    /// 预编译的 `.spv` 二进制。
    Binary,
}

/// `opencl://platform:device/file/path/kernel.cl`
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Locator {
    uri: String,
    platform: String,
    device: String,
    path: PathBuf,
    kind: ProgramKind,
}

impl Locator {
    pub fn parse(uri: &str) -> Result<Self, StreamError> {
        let bad_url = || {
            malformed_locator(format!(
                "Unsupported URL \"{uri}\", expecting '{SCHEME}platform:device/file/path/kernel.cl'"
            ))
        };

        let rest = uri.strip_prefix(SCHEME).ok_or_else(bad_url)?;
        let (platform, rest) = rest.split_once(':').ok_or_else(bad_url)?;
        // 路径保留开头的 '/'
        let slash = rest.find('/').ok_or_else(bad_url)?;
        let (device, path) = rest.split_at(slash);

        let path = PathBuf::from(path);
        let kind = match path.extension().and_then(|ext| ext.to_str()) {
            Some("spv") => ProgramKind::Binary,
            Some(_) => ProgramKind::Source,
            None => return Err(bad_url()),
        };

        Ok(Self {
            uri: uri.into(),
            platform: platform.into(),
            device: device.into(),
            path,
            kind,
        })
    }

    #[inline]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    #[inline]
    pub fn platform(&self) -> &str {
        &self.platform
    }

    #[inline]
    pub fn device(&self) -> &str {
        &self.device
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn kind(&self) -> ProgramKind {
        self.kind
    }

    /// 空提示匹配任意名字。
    #[inline]
    pub fn matches_platform(&self, name: &str) -> bool {
        name.contains(&*self.platform)
    }

    #[inline]
    pub fn matches_device(&self, name: &str) -> bool {
        name.contains(&*self.device)
    }
}

impl FromStr for Locator {
    type Err = StreamError;
    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{SCHEME}{}:{}{}",
            self.platform,
            self.device,
            self.path.display()
        )
    }
}
