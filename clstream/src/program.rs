use crate::{compile_failed, io_failed, Locator, ProgramKind, StreamError};
use common::{BuildError, Hardware};
use log::{info, warn};
use std::{fs, path::Path};

/// 绑定到某个上下文的可执行程序，每个流恰好持有一个。
pub struct Program<H: Hardware> {
    inner: H::Program,
    kind: ProgramKind,
}

impl<H: Hardware> Program<H> {
    /// 读取定位符指向的文件，编译源码或直接加载二进制。
    ///
    /// 源码不带任何编译选项构建：某些实现在指定选项时会构建失败。
    /// 二进制不在加载时检查与设备是否兼容，不兼容会推迟到创建入口时暴露。
    pub fn load(hardware: &H, locator: &Locator) -> Result<Self, StreamError> {
        let path = locator.path();
        let bytes = read_nonempty(path)?;
        let kind = locator.kind();
        let inner = match kind {
            ProgramKind::Source => {
                let src = String::from_utf8(bytes).map_err(|_| {
                    io_failed(format!("Source file {} is not UTF-8 text", path.display()))
                })?;
                match hardware.build_from_source(&src) {
                    Ok(program) => program,
                    Err(BuildError::BuildFailed(log)) => {
                        warn!("{log}");
                        return Err(compile_failed(format!(
                            "Unable to compile source file {} in URL \"{}\":\n{log}",
                            path.display(),
                            locator.uri(),
                        )));
                    }
                    Err(BuildError::Others(e)) => {
                        return Err(compile_failed(format!(
                            "Unable to build source file {} in URL \"{}\": {e}",
                            path.display(),
                            locator.uri(),
                        )))
                    }
                }
            }
            ProgramKind::Binary => hardware.load_binary(&bytes).map_err(|e| {
                compile_failed(format!(
                    "Unable to load binary file {} in URL \"{}\": {e}",
                    path.display(),
                    locator.uri(),
                ))
            })?,
        };
        info!("Loaded {kind:?} program {}", path.display());
        Ok(Self { inner, kind })
    }

    #[inline]
    pub fn kind(&self) -> ProgramKind {
        self.kind
    }

    #[inline]
    pub(crate) fn inner(&self) -> &H::Program {
        &self.inner
    }
}

/// 空文件与缺失的文件同等对待。
fn read_nonempty(path: &Path) -> Result<Vec<u8>, StreamError> {
    match fs::read(path) {
        Ok(bytes) if !bytes.is_empty() => Ok(bytes),
        Ok(_) => Err(io_failed(format!("Kernel file {} is empty", path.display()))),
        Err(e) => Err(io_failed(format!(
            "Unable to read kernel file {}: {e}",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod test {
    use super::Program;
    use crate::{
        common_cpu::{Cpu, Host},
        test_utils::kernel_uri,
        Device, Driver, Locator, Platform, ProgramKind, StreamErrorKind,
    };

    fn host() -> Host {
        let platform = Cpu::default().platforms().unwrap().remove(0);
        platform.devices().unwrap().remove(0).context().unwrap()
    }

    fn load(file: &str) -> Result<Program<Host>, crate::StreamError> {
        Program::load(&host(), &Locator::parse(&kernel_uri(file)).unwrap())
    }

    #[test]
    fn test_compile_source() {
        let program = load("vec_mult.cl").unwrap();
        assert_eq!(program.kind(), ProgramKind::Source);
    }

    #[test]
    fn test_binary_skips_compile() {
        // 内容不是合法源码，但 .spv 不经过编译
        let program = load("vec_mult.spv").unwrap();
        assert_eq!(program.kind(), ProgramKind::Binary);
    }

    #[test]
    fn test_compile_error_carries_log() {
        let err = load("broken.cl").err().unwrap();
        assert_eq!(err.kind, StreamErrorKind::Compile);
        assert!(err.info.contains("broken.cl"));
        assert!(err.info.contains("error:"));
    }

    #[test]
    fn test_missing_and_empty() {
        for file in ["empty.cl", "no_such_kernel.cl", "no_such_kernel.spv"] {
            let err = load(file).err().unwrap();
            assert_eq!(err.kind, StreamErrorKind::Io, "{file}");
            assert!(err.info.contains(file));
        }
    }
}
