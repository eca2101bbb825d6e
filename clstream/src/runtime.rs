use crate::{device_not_found, Atom, Stream, StreamError};
use common::{Device, Driver, DriverError, Platform};
use log::debug;
use std::sync::{Arc, OnceLock};

/// 宿主可以对流执行的一条命令。
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Command {
    pub summary: &'static str,
    pub link: &'static str,
    /// 命令要求的载荷类型，`None` 表示不需要参数。
    pub payload: Option<&'static str>,
}

/// 流的描述记录，供宿主自省。
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Description {
    pub stream: &'static str,
    pub commands: Vec<Command>,
}

impl Description {
    fn build() -> Self {
        Self {
            stream: "OpenclStream",
            commands: vec![
                Command {
                    summary: "Open connection to GPU",
                    link: "OpenLink",
                    payload: None,
                },
                Command {
                    summary: "Write kernel and data to GPU",
                    link: "WriteLink",
                    payload: Some("ItemNode"),
                },
            ],
        }
    }
}

/// 一个平台及其设备的名字。
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PlatformSummary {
    pub name: String,
    pub devices: Vec<String>,
}

/// 顶层运行时：持有驱动和惰性构建的描述记录，负责打开流。
pub struct Runtime<D> {
    driver: D,
    description: OnceLock<Arc<Description>>,
}

impl<D: Driver> Runtime<D> {
    #[inline]
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            description: OnceLock::new(),
        }
    }

    #[inline]
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// 描述记录在第一次访问时构建，此后所有流共享同一份。
    pub fn describe(&self) -> Arc<Description> {
        self.description
            .get_or_init(|| {
                debug!("build stream description");
                Arc::new(Description::build())
            })
            .clone()
    }

    /// 丢弃已构建的描述记录，下次访问时重建。
    #[inline]
    pub fn reset_description(&mut self) {
        self.description.take();
    }

    #[inline]
    pub fn open(&self, uri: &str) -> Result<Stream<D>, StreamError> {
        Stream::open(&self.driver, uri, self.describe())
    }

    #[inline]
    pub fn open_node(&self, node: &Atom) -> Result<Stream<D>, StreamError> {
        Stream::open_node(&self.driver, node, self.describe())
    }

    /// 按枚举顺序列出所有平台和设备的名字。
    pub fn survey(&self) -> Result<Vec<PlatformSummary>, StreamError> {
        let failed = |e: DriverError| device_not_found(format!("Unable to enumerate devices: {e}"));
        self.driver
            .platforms()
            .map_err(failed)?
            .into_iter()
            .map(|platform| -> Result<PlatformSummary, StreamError> {
                let devices = platform
                    .devices()
                    .map_err(failed)?
                    .iter()
                    .map(|d| d.name().map_err(failed))
                    .collect::<Result<_, _>>()?;
                Ok(PlatformSummary {
                    name: platform.name().map_err(failed)?,
                    devices,
                })
            })
            .collect()
    }
}
