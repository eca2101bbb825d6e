//! 主机上的参考设备。
//!
//! 可以模拟任意的平台和设备列表，并在主机线程池上解释执行 OpenCL C 子集，
//! 用于在没有 OpenCL 运行时的环境中验证流的行为。

mod kernel;

use common::{locate_error, BuildError, Device, Driver, DriverError, Hardware, KernelArg, Platform};
use kernel::{ArgView, KernelDef};
use log::debug;
use std::{
    collections::HashMap,
    sync::{Arc, RwLock, RwLockReadGuard},
};

/// 主机驱动。
#[derive(Clone, Debug)]
pub struct Cpu(Vec<CpuPlatform>);

impl Default for Cpu {
    fn default() -> Self {
        Self::with_platforms([("Common CPU", &["ThisThread"][..])])
    }
}

impl Cpu {
    /// 按给定的名字模拟平台和设备，枚举顺序与输入一致。
    pub fn with_platforms<'a, I, S>(platforms: I) -> Self
    where
        I: IntoIterator<Item = (S, &'a [S])>,
        S: AsRef<str> + 'a,
    {
        Self(
            platforms
                .into_iter()
                .map(|(name, devices)| CpuPlatform {
                    name: name.as_ref().into(),
                    devices: devices.iter().map(|d| d.as_ref().into()).collect(),
                })
                .collect(),
        )
    }
}

impl Driver for Cpu {
    type Platform = CpuPlatform;

    #[inline]
    fn platforms(&self) -> Result<Vec<Self::Platform>, DriverError> {
        Ok(self.0.clone())
    }
}

#[derive(Clone, Debug)]
pub struct CpuPlatform {
    name: String,
    devices: Vec<String>,
}

impl Platform for CpuPlatform {
    type Device = CpuDevice;

    #[inline]
    fn name(&self) -> Result<String, DriverError> {
        Ok(self.name.clone())
    }

    #[inline]
    fn devices(&self) -> Result<Vec<Self::Device>, DriverError> {
        Ok(self.devices.iter().cloned().map(CpuDevice).collect())
    }
}

#[derive(Clone, Debug)]
pub struct CpuDevice(String);

impl Device for CpuDevice {
    type Hardware = Host;

    #[inline]
    fn name(&self) -> Result<String, DriverError> {
        Ok(self.0.clone())
    }

    #[inline]
    fn context(&self) -> Result<Self::Hardware, DriverError> {
        Ok(Host {
            device: self.0.clone(),
        })
    }
}

/// 主机设备上的上下文。
#[derive(Debug)]
pub struct Host {
    device: String,
}

/// 主机设备上的程序。
#[derive(Debug)]
pub enum HostProgram {
    Source(HashMap<String, HostKernel>),
    /// 预编译的二进制只能保存，主机设备无法从中取出入口。
    Binary(Box<[u8]>),
}

#[derive(Clone, Debug)]
pub struct HostKernel(Arc<KernelDef>);

/// 主机内存上的存储区。
#[derive(Debug)]
pub struct HostBuffer {
    data: RwLock<Vec<f64>>,
    writable: bool,
}

enum Bound<'a> {
    Buffer(RwLockReadGuard<'a, Vec<f64>>, bool),
    Scalar(f64),
}

impl Hardware for Host {
    type Program = HostProgram;
    type Kernel = HostKernel;
    type Buffer = HostBuffer;

    fn build_from_source(&self, src: &str) -> Result<Self::Program, BuildError> {
        let kernels = kernel::compile(src).map_err(BuildError::BuildFailed)?;
        debug!("{} built {} kernels", self.device, kernels.len());
        Ok(HostProgram::Source(
            kernels
                .into_iter()
                .map(|k| (k.name().to_string(), HostKernel(Arc::new(k))))
                .collect(),
        ))
    }

    #[inline]
    fn load_binary(&self, bin: &[u8]) -> Result<Self::Program, DriverError> {
        Ok(HostProgram::Binary(bin.into()))
    }

    fn get_kernel(&self, program: &Self::Program, name: &str) -> Result<Self::Kernel, DriverError> {
        match program {
            HostProgram::Source(kernels) => kernels
                .get(name)
                .cloned()
                .ok_or_else(|| locate_error!(format!("no kernel named \"{name}\" in program"))),
            HostProgram::Binary(bin) => Err(locate_error!(format!(
                "{} cannot execute a precompiled binary of {} bytes",
                self.device,
                bin.len()
            ))),
        }
    }

    #[inline]
    fn num_args(&self, kernel: &Self::Kernel) -> Result<usize, DriverError> {
        Ok(kernel.0.params().len())
    }

    #[inline]
    fn copy_from_host(&self, data: &[f64]) -> Result<Self::Buffer, DriverError> {
        Ok(HostBuffer {
            data: RwLock::new(data.to_vec()),
            writable: false,
        })
    }

    #[inline]
    fn malloc(&self, len: usize) -> Result<Self::Buffer, DriverError> {
        Ok(HostBuffer {
            data: RwLock::new(vec![0.; len]),
            writable: true,
        })
    }

    fn launch(
        &self,
        kernel: &Self::Kernel,
        args: &[KernelArg<Self::Buffer>],
        global: usize,
    ) -> Result<(), DriverError> {
        let def = &kernel.0;
        if args.len() != def.params().len() {
            return Err(locate_error!(format!(
                "kernel \"{}\" takes {} arguments, {} given",
                def.name(),
                def.params().len(),
                args.len()
            )));
        }

        let stores = {
            let bound = args
                .iter()
                .map(|arg| match arg {
                    KernelArg::Buffer(b) => b
                        .data
                        .read()
                        .map(|data| Bound::Buffer(data, b.writable))
                        .map_err(|_| locate_error!("buffer lock poisoned")),
                    KernelArg::Scalar(v) => Ok(Bound::Scalar(*v as f64)),
                })
                .collect::<Result<Vec<_>, _>>()?;
            let views = bound
                .iter()
                .map(|b| match b {
                    Bound::Buffer(data, writable) => ArgView::Buffer {
                        data,
                        writable: *writable,
                    },
                    Bound::Scalar(v) => ArgView::Scalar(*v),
                })
                .collect::<Vec<_>>();
            def.execute(&views, global)
                .map_err(|e| locate_error!(format!("{}: {e}", self.device)))?
        };

        for (i, arg) in args.iter().enumerate() {
            let KernelArg::Buffer(b) = arg else {
                continue;
            };
            if !stores.iter().any(|s| s.param == i) {
                continue;
            }
            let mut data = b
                .data
                .write()
                .map_err(|_| locate_error!("buffer lock poisoned"))?;
            for s in stores.iter().filter(|s| s.param == i) {
                data[s.index] = s.value
            }
        }
        Ok(())
    }

    fn read(&self, buffer: &Self::Buffer, dst: &mut [f64]) -> Result<(), DriverError> {
        let data = buffer
            .data
            .read()
            .map_err(|_| locate_error!("buffer lock poisoned"))?;
        if dst.len() > data.len() {
            return Err(locate_error!(format!(
                "read of {} elements from a buffer of {}",
                dst.len(),
                data.len()
            )));
        }
        dst.copy_from_slice(&data[..dst.len()]);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{Cpu, Host};
    use crate::{test_utils::kernel_path, BuildError, Device, Driver, Hardware, KernelArg, Platform};
    use std::fs;

    fn host() -> Host {
        let platform = Cpu::default().platforms().unwrap().remove(0);
        assert_eq!(platform.name().unwrap(), "Common CPU");
        let device = platform.devices().unwrap().remove(0);
        assert_eq!(device.name().unwrap(), "ThisThread");
        device.context().unwrap()
    }

    #[test]
    fn test_with_platforms() {
        let devices = vec!["x".to_string(), "y".to_string()];
        let cpu = Cpu::with_platforms([("A".to_string(), &devices[..])]);
        let platforms = cpu.platforms().unwrap();
        assert_eq!(platforms.len(), 1);
        let devices = platforms[0].devices().unwrap();
        assert_eq!(devices[1].name().unwrap(), "y");
    }

    #[test]
    fn test_launch() {
        let host = host();
        let src = fs::read_to_string(kernel_path("vec_add.cl")).unwrap();
        let program = host.build_from_source(&src).unwrap();
        let kernel = host.get_kernel(&program, "vec_add").unwrap();
        assert_eq!(host.num_args(&kernel).unwrap(), 4);
        assert!(host.get_kernel(&program, "vec_mult").is_err());

        let a = host.copy_from_host(&[1., 2., 3.]).unwrap();
        let b = host.copy_from_host(&[4., 5., 6.]).unwrap();
        let y = host.malloc(3).unwrap();
        let args = [
            KernelArg::Buffer(&y),
            KernelArg::Buffer(&a),
            KernelArg::Buffer(&b),
            KernelArg::Scalar(3),
        ];
        host.launch(&kernel, &args, 3).unwrap();

        let mut ans = [0.; 3];
        host.read(&y, &mut ans).unwrap();
        assert_eq!(ans, [5., 7., 9.]);
        assert!(host.read(&y, &mut [0.; 4]).is_err());

        // 参数个数不符
        assert!(host.launch(&kernel, &args[..3], 3).is_err());
        // 输出绑定到只读存储区
        let args = [
            KernelArg::Buffer(&a),
            KernelArg::Buffer(&a),
            KernelArg::Buffer(&b),
            KernelArg::Scalar(3),
        ];
        assert!(host.launch(&kernel, &args, 3).is_err());
        let mut ans = [0.; 3];
        host.read(&a, &mut ans).unwrap();
        assert_eq!(ans, [1., 2., 3.]);
    }

    #[test]
    fn test_build_failed() {
        let src = fs::read_to_string(kernel_path("broken.cl")).unwrap();
        match host().build_from_source(&src) {
            Err(BuildError::BuildFailed(log)) => assert!(log.contains("error:"), "{log}"),
            _ => panic!("broken.cl should not build"),
        }
    }

    #[test]
    fn test_binary_has_no_kernels() {
        let host = host();
        let bin = fs::read(kernel_path("vec_mult.spv")).unwrap();
        let program = host.load_binary(&bin).unwrap();
        let err = host.get_kernel(&program, "vec_mult").unwrap_err();
        assert!(err.message().contains("precompiled binary"));
    }
}
