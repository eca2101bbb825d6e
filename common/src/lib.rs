#![deny(warnings)]

mod error;

pub use error::{BuildError, DriverError};

/// 计算驱动，能够枚举平台。
pub trait Driver {
    type Platform: Platform;

    /// 按驱动报告的顺序枚举全部平台。
    fn platforms(&self) -> Result<Vec<Self::Platform>, DriverError>;
}

/// 计算平台，即某个厂商的运行时。
pub trait Platform {
    type Device: Device;

    fn name(&self) -> Result<String, DriverError>;
    /// 枚举平台下所有类型的设备。
    fn devices(&self) -> Result<Vec<Self::Device>, DriverError>;
}

/// 平台下的一个计算设备。
pub trait Device {
    type Hardware: Hardware;

    fn name(&self) -> Result<String, DriverError>;
    /// 在设备上创建执行上下文和任务队列。
    fn context(&self) -> Result<Self::Hardware, DriverError>;
}

/// 算力硬件抽象。
///
/// 由持有上下文和任务队列的类型实现。所有操作都是同步的：
/// 发射和读回在返回之前都会等待设备完成。
pub trait Hardware {
    /// 编译或加载得到的可执行程序。
    type Program;
    /// 程序中的一个入口。
    type Kernel;
    /// 设备上的 `f64` 存储区。
    type Buffer;

    /// 不带任何编译选项地从源码构建程序。
    fn build_from_source(&self, src: &str) -> Result<Self::Program, BuildError>;
    /// 从预编译的二进制创建程序，不做额外构建。
    fn load_binary(&self, bin: &[u8]) -> Result<Self::Program, DriverError>;
    fn get_kernel(&self, program: &Self::Program, name: &str) -> Result<Self::Kernel, DriverError>;
    /// 入口声明的参数个数。
    fn num_args(&self, kernel: &Self::Kernel) -> Result<usize, DriverError>;

    /// 创建只读存储区，创建时从主机拷贝数据。
    fn copy_from_host(&self, data: &[f64]) -> Result<Self::Buffer, DriverError>;
    /// 创建可读写存储区。
    fn malloc(&self, len: usize) -> Result<Self::Buffer, DriverError>;

    /// 在 `global` 个工作项上一维发射，阻塞直到完成。
    fn launch(
        &self,
        kernel: &Self::Kernel,
        args: &[KernelArg<Self::Buffer>],
        global: usize,
    ) -> Result<(), DriverError>;
    /// 阻塞读回存储区的前 `dst.len()` 个元素。
    fn read(&self, buffer: &Self::Buffer, dst: &mut [f64]) -> Result<(), DriverError>;
}

/// 按位置绑定的入口参数。
#[derive(Debug)]
pub enum KernelArg<'a, B> {
    Buffer(&'a B),
    Scalar(u64),
}

impl<B> Clone for KernelArg<'_, B> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<B> Copy for KernelArg<'_, B> {}

pub type PlatformOf<D> = <D as Driver>::Platform;
pub type DeviceOf<D> = <PlatformOf<D> as Platform>::Device;
pub type HardwareOf<D> = <DeviceOf<D> as Device>::Hardware;
pub type ProgramOf<H> = <H as Hardware>::Program;
pub type BufferOf<H> = <H as Hardware>::Buffer;
