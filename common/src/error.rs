use core::fmt;
use std::error::Error;

/// 驱动层错误，记录出错的源码位置。
#[derive(Clone)]
pub struct DriverError {
    file: &'static str,
    line: u32,
    message: String,
}

impl Error for DriverError {}

impl DriverError {
    #[inline]
    pub const fn new(file: &'static str, line: u32, message: String) -> Self {
        Self {
            file,
            line,
            message,
        }
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Debug for DriverError {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}: {:?}", self.file, self.line, self.message)
    }
}

impl fmt::Display for DriverError {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({}:{})", self.message, self.file, self.line)
    }
}

#[macro_export]
macro_rules! locate_error {
    ($msg:expr) => {
        $crate::DriverError::new(file!(), line!(), $msg.to_string())
    };
    () => {
        $crate::locate_error!("Error occurred")
    };
}

/// 程序构建失败。
#[derive(Clone, Debug)]
pub enum BuildError {
    /// 编译器拒绝了源码，携带设备的构建日志。
    BuildFailed(String),
    /// 构建之前驱动就出错了。
    Others(DriverError),
}

impl From<DriverError> for BuildError {
    #[inline]
    fn from(value: DriverError) -> Self {
        Self::Others(value)
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::BuildFailed(log) => write!(f, "build failed:\n{log}"),
            Self::Others(err) => write!(f, "{err}"),
        }
    }
}

impl Error for BuildError {}

#[test]
fn test_locate_error() {
    fn error() -> DriverError {
        locate_error!("no platform")
    }
    let e = error();
    assert_eq!(e.message(), "no platform");
    assert!(e.to_string().starts_with("no platform ("));
    assert!(format!("{e:?}").contains("error.rs"));
}

#[test]
fn test_build_error_display() {
    let e = BuildError::BuildFailed("1:1: error: expected '('".into());
    assert!(e.to_string().contains("expected '('"));
    let e = BuildError::from(locate_error!());
    assert!(e.to_string().starts_with("Error occurred"));
}
