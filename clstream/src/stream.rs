use crate::{
    closed, execution_failed, invalid_request, not_ready, resolve, Atom, Description,
    InvocationRequest, Locator, Program, ResolvedDevice, StreamError,
};
use common::{BufferOf, Driver, Hardware, HardwareOf};
use log::{debug, info};
use std::sync::Arc;

/// 流的状态。
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum State {
    /// 程序已就绪，尚未执行过调用。
    Loaded,
    /// 最近一次调用的结果可读。
    Ready,
    /// 设备资源已释放。
    Closed,
}

/// 把一个计算设备暴露为可写入调用、可读回结果的流。
///
/// 打开时解析定位符、选择设备并编译或加载程序；之后可以反复 [`submit`](Self::submit)
/// 和 [`fetch_result`](Self::fetch_result)。所有操作都在调用线程上同步完成。
pub struct Stream<D: Driver> {
    locator: Locator,
    description: Arc<Description>,
    value: Vec<Atom>,
    live: Option<Live<D>>,
}

// 字段按声明顺序释放：存储区、程序、上下文。
struct Live<D: Driver> {
    invocation: Option<Invocation<HardwareOf<D>>>,
    program: Program<HardwareOf<D>>,
    device: ResolvedDevice<D>,
}

struct Invocation<H: Hardware> {
    kernel: String,
    vec_dim: usize,
    output: H::Buffer,
    _inputs: Vec<H::Buffer>,
}

impl<D: Driver> Stream<D> {
    /// 打开流。任何一步失败都不会返回部分打开的流，已获取的资源随错误一起释放。
    pub fn open(driver: &D, uri: &str, description: Arc<Description>) -> Result<Self, StreamError> {
        let locator = Locator::parse(uri)?;
        let device = resolve(driver, &locator)?;
        let program = Program::load(device.hardware(), &locator)?;
        Ok(Self {
            locator,
            description,
            value: Vec::new(),
            live: Some(Live {
                invocation: None,
                program,
                device,
            }),
        })
    }

    /// 从传感节点打开流，节点名就是定位符。
    pub fn open_node(
        driver: &D,
        node: &Atom,
        description: Arc<Description>,
    ) -> Result<Self, StreamError> {
        match node {
            Atom::Sensory(uri) => Self::open(driver, uri, description),
            _ => Err(invalid_request(format!("Expecting SensoryNode, got {node}"))),
        }
    }

    #[inline]
    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    #[inline]
    pub fn describe(&self) -> &Description {
        &self.description
    }

    pub fn state(&self) -> State {
        match &self.live {
            None => State::Closed,
            Some(Live {
                invocation: None, ..
            }) => State::Loaded,
            Some(Live {
                invocation: Some(_),
                ..
            }) => State::Ready,
        }
    }

    /// 选中的设备，流关闭后返回 `None`。
    #[inline]
    pub fn device(&self) -> Option<&ResolvedDevice<D>> {
        self.live.as_ref().map(|live| &live.device)
    }

    /// 最近一次成功调用的工作长度。
    #[inline]
    pub fn vec_dim(&self) -> Option<usize> {
        self.live
            .as_ref()
            .and_then(|live| live.invocation.as_ref())
            .map(|inv| inv.vec_dim)
    }

    /// 执行一次调用并等待设备完成。
    ///
    /// 所有输入截断到最短输入的长度。
    /// 失败时流保持调用前的状态和结果，可以用修正后的请求重试。
    pub fn submit(&mut self, request: &InvocationRequest) -> Result<(), StreamError> {
        let uri = self.locator.uri();
        let Some(live) = &mut self.live else {
            return Err(closed(format!("Stream \"{uri}\" is closed")));
        };
        let hardware = live.device.hardware();
        let name = request.kernel();
        let vec_dim = request.vec_dim();
        debug!(
            "submit \"{name}\" with {} inputs, vec_dim = {vec_dim}",
            request.inputs().len()
        );

        let inputs = request
            .inputs()
            .iter()
            .map(|v| hardware.copy_from_host(&v[..vec_dim]))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| execution_failed(format!("Unable to upload inputs for \"{name}\": {e}")))?;

        let kernel = hardware
            .get_kernel(live.program.inner(), name)
            .map_err(|e| {
                execution_failed(format!(
                    "Unable to find kernel \"{name}\" in {}: {e}",
                    self.locator.path().display()
                ))
            })?;
        let num_args = hardware
            .num_args(&kernel)
            .map_err(|e| execution_failed(format!("Unable to inspect kernel \"{name}\": {e}")))?;
        request.schema().check(name, num_args)?;

        let output = hardware.malloc(vec_dim).map_err(|e| {
            execution_failed(format!("Unable to allocate output for \"{name}\": {e}"))
        })?;

        launch::<HardwareOf<D>>(hardware, &kernel, request, &output, &inputs)?;

        live.invocation = Some(Invocation {
            kernel: name.into(),
            vec_dim,
            output,
            _inputs: inputs,
        });
        Ok(())
    }

    /// 解析宿主写入的调用并执行。
    #[inline]
    pub fn write(&mut self, item: &Atom) -> Result<(), StreamError> {
        self.submit(&InvocationRequest::try_from(item)?)
    }

    /// 阻塞读回最近一次调用的结果。
    pub fn fetch_result(&self) -> Result<Vec<f64>, StreamError> {
        let uri = self.locator.uri();
        let Some(live) = &self.live else {
            return Err(closed(format!("Stream \"{uri}\" is closed")));
        };
        let Some(inv) = &live.invocation else {
            return Err(not_ready(format!(
                "Stream \"{uri}\" has not run any kernel yet"
            )));
        };
        let mut result = vec![0.; inv.vec_dim];
        live.device
            .hardware()
            .read(&inv.output, &mut result)
            .map_err(|e| {
                execution_failed(format!("Unable to read result of \"{}\": {e}", inv.kernel))
            })?;
        Ok(result)
    }

    /// 读回结果并包装成单个数值向量。
    pub fn update(&mut self) -> Result<&[Atom], StreamError> {
        let result = self.fetch_result()?;
        self.value = vec![Atom::Number(result)];
        Ok(&self.value)
    }

    /// 释放全部设备资源。可以重复调用。
    pub fn close(&mut self) {
        self.value.clear();
        if self.live.take().is_some() {
            info!("Closed stream \"{}\"", self.locator.uri());
        }
    }
}

impl<D: Driver> Drop for Stream<D> {
    #[inline]
    fn drop(&mut self) {
        self.close()
    }
}

fn launch<H: Hardware>(
    hardware: &H,
    kernel: &H::Kernel,
    request: &InvocationRequest,
    output: &BufferOf<H>,
    inputs: &[BufferOf<H>],
) -> Result<(), StreamError> {
    let vec_dim = request.vec_dim();
    let args = request.schema().bind(output, inputs, vec_dim as u64);
    hardware.launch(kernel, &args, vec_dim).map_err(|e| {
        execution_failed(format!(
            "Kernel \"{}\" failed over {vec_dim} work items: {e}",
            request.kernel()
        ))
    })
}
