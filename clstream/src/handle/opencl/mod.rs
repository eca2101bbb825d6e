//! 通过 OpenCL ICD 访问真实设备。

use common::{locate_error, BuildError, Device, Driver, DriverError, Hardware, KernelArg, Platform};
use opencl3::{
    command_queue::CommandQueue,
    context::Context,
    device::CL_DEVICE_TYPE_ALL,
    kernel::{ExecuteKernel, Kernel},
    memory::{Buffer, CL_MEM_COPY_HOST_PTR, CL_MEM_READ_ONLY, CL_MEM_READ_WRITE},
    platform::get_platforms,
    program::Program,
    types::{cl_double, cl_ulong, CL_BLOCKING},
};
use std::{ffi::c_void, ptr::null_mut};

/// OpenCL 驱动，枚举 ICD 加载器报告的全部平台。
#[derive(Clone, Copy, Default, Debug)]
pub struct ClDriver;

impl Driver for ClDriver {
    type Platform = ClPlatform;

    fn platforms(&self) -> Result<Vec<Self::Platform>, DriverError> {
        Ok(get_platforms()
            .map_err(|e| locate_error!(e))?
            .into_iter()
            .map(ClPlatform)
            .collect())
    }
}

pub struct ClPlatform(opencl3::platform::Platform);
pub struct ClDevice(opencl3::device::Device);

/// 设备上的上下文和默认任务队列。
pub struct ClContext {
    queue: CommandQueue,
    context: Context,
    device: opencl3::device::Device,
}

// SAFETY: OpenCL 1.2 起上下文和任务队列都是线程安全的句柄，并发访问由运行时串行化。
// 平台和设备只保存整数形式的 id，本身就是 Send。
unsafe impl Send for ClContext {}

impl Platform for ClPlatform {
    type Device = ClDevice;

    #[inline]
    fn name(&self) -> Result<String, DriverError> {
        self.0.name().map_err(|e| locate_error!(e))
    }

    fn devices(&self) -> Result<Vec<Self::Device>, DriverError> {
        Ok(self
            .0
            .get_devices(CL_DEVICE_TYPE_ALL)
            .map_err(|e| locate_error!(e))?
            .into_iter()
            .map(|id| ClDevice(opencl3::device::Device::new(id)))
            .collect())
    }
}

impl Device for ClDevice {
    type Hardware = ClContext;

    #[inline]
    fn name(&self) -> Result<String, DriverError> {
        self.0.name().map_err(|e| locate_error!(e))
    }

    fn context(&self) -> Result<Self::Hardware, DriverError> {
        let context = Context::from_device(&self.0).map_err(|e| locate_error!(e))?;
        #[allow(deprecated)]
        let queue = CommandQueue::create_default(&context, 0).map_err(|e| locate_error!(e))?;
        Ok(ClContext {
            queue,
            context,
            device: opencl3::device::Device::new(self.0.id()),
        })
    }
}

impl Hardware for ClContext {
    type Program = Program;
    type Kernel = Kernel;
    type Buffer = Buffer<cl_double>;

    fn build_from_source(&self, src: &str) -> Result<Self::Program, BuildError> {
        let mut program =
            Program::create_from_source(&self.context, src).map_err(|e| locate_error!(e))?;
        let id = self.device.id();
        match program.build(&[id], "") {
            Ok(()) => Ok(program),
            Err(e) => {
                let log = program.get_build_log(id).map_err(|e| locate_error!(e))?;
                Err(BuildError::BuildFailed(if log.trim().is_empty() {
                    e.to_string()
                } else {
                    log
                }))
            }
        }
    }

    #[inline]
    fn load_binary(&self, bin: &[u8]) -> Result<Self::Program, DriverError> {
        Program::create_from_il(&self.context, bin).map_err(|e| locate_error!(e))
    }

    #[inline]
    fn get_kernel(&self, program: &Self::Program, name: &str) -> Result<Self::Kernel, DriverError> {
        Kernel::create(program, name).map_err(|e| locate_error!(e))
    }

    #[inline]
    fn num_args(&self, kernel: &Self::Kernel) -> Result<usize, DriverError> {
        kernel
            .num_args()
            .map(|n| n as _)
            .map_err(|e| locate_error!(e))
    }

    fn copy_from_host(&self, data: &[f64]) -> Result<Self::Buffer, DriverError> {
        unsafe {
            Buffer::<cl_double>::create(
                &self.context,
                CL_MEM_READ_ONLY | CL_MEM_COPY_HOST_PTR,
                data.len(),
                data.as_ptr() as *mut c_void,
            )
        }
        .map_err(|e| locate_error!(e))
    }

    fn malloc(&self, len: usize) -> Result<Self::Buffer, DriverError> {
        unsafe { Buffer::<cl_double>::create(&self.context, CL_MEM_READ_WRITE, len, null_mut()) }
            .map_err(|e| locate_error!(e))
    }

    fn launch(
        &self,
        kernel: &Self::Kernel,
        args: &[KernelArg<Self::Buffer>],
        global: usize,
    ) -> Result<(), DriverError> {
        let scalars = args
            .iter()
            .map(|arg| match arg {
                KernelArg::Scalar(v) => *v as cl_ulong,
                KernelArg::Buffer(_) => 0,
            })
            .collect::<Vec<_>>();

        let mut exec = ExecuteKernel::new(kernel);
        for (arg, scalar) in args.iter().zip(&scalars) {
            match arg {
                KernelArg::Buffer(buf) => unsafe { exec.set_arg(*buf) },
                KernelArg::Scalar(_) => unsafe { exec.set_arg(scalar) },
            };
        }
        let event = unsafe { exec.set_global_work_size(global).enqueue_nd_range(&self.queue) }
            .map_err(|e| locate_error!(e))?;
        event.wait().map_err(|e| locate_error!(e))
    }

    fn read(&self, buffer: &Self::Buffer, dst: &mut [f64]) -> Result<(), DriverError> {
        let event = unsafe {
            self.queue
                .enqueue_read_buffer(buffer, CL_BLOCKING, 0, dst, &[])
        }
        .map_err(|e| locate_error!(e))?;
        event.wait().map_err(|e| locate_error!(e))
    }
}
