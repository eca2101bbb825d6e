//! 把计算设备暴露为以 URI 寻址的数据流。
//!
//! 流在打开时解析 `opencl://platform:device/path/kernel.cl`，选出设备并编译或加载程序；
//! 此后每次写入一个入口名和若干输入向量，流就在设备上执行一次，结果可随后读回。

mod error;
mod handle;

pub mod atom;
pub mod locator;
pub mod program;
pub mod request;
pub mod resolve;
pub mod runtime;
pub mod stream;

pub use atom::Atom;
pub use error::{functions::*, StreamError, StreamErrorKind};
pub use locator::{Locator, ProgramKind, SCHEME};
pub use program::Program;
pub use request::{ArgSchema, ArgSlot, InvocationRequest};
pub use resolve::{resolve, ResolvedDevice};
pub use runtime::{Command, Description, PlatformSummary, Runtime};
pub use stream::{State, Stream};

pub use common::{BuildError, Device, Driver, DriverError, Hardware, KernelArg, Platform};

#[cfg(any(use_cpu, test))]
pub use handle::common_cpu;

#[cfg(use_cl)]
pub use handle::opencl;
#[cfg(use_cl)]
pub extern crate opencl3;

#[cfg(test)]
pub(crate) mod test_utils {
    use std::path::PathBuf;

    /// 测试用内核文件的定位符，不限定平台和设备。
    pub fn kernel_uri(file: &str) -> String {
        format!("opencl://:{}", kernel_path(file).display())
    }

    pub fn kernel_path(file: &str) -> PathBuf {
        [env!("CARGO_MANIFEST_DIR"), "kernels", file].iter().collect()
    }
}
