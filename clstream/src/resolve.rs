use crate::{device_not_found, Locator, StreamError};
use common::{Device, DeviceOf, Driver, DriverError, HardwareOf, Platform, PlatformOf};
use log::info;

/// 选中的平台和设备，以及在设备上打开的上下文和任务队列。
pub struct ResolvedDevice<D: Driver> {
    // 上下文先于设备句柄释放
    hardware: HardwareOf<D>,
    device: DeviceOf<D>,
    platform: PlatformOf<D>,
    platform_name: String,
    device_name: String,
}

impl<D: Driver> ResolvedDevice<D> {
    #[inline]
    pub fn hardware(&self) -> &HardwareOf<D> {
        &self.hardware
    }

    #[inline]
    pub fn device(&self) -> &DeviceOf<D> {
        &self.device
    }

    #[inline]
    pub fn platform(&self) -> &PlatformOf<D> {
        &self.platform
    }

    #[inline]
    pub fn platform_name(&self) -> &str {
        &self.platform_name
    }

    #[inline]
    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

/// 按定位符中的提示选出第一个匹配的平台和设备，并打开上下文。
pub fn resolve<D: Driver>(driver: &D, locator: &Locator) -> Result<ResolvedDevice<D>, StreamError> {
    let uri = locator.uri();
    let enumerate_failed =
        |e: DriverError| device_not_found(format!("Unable to enumerate devices for URL \"{uri}\": {e}"));

    let mut seen = Vec::new();
    for platform in driver.platforms().map_err(enumerate_failed)? {
        let pname = platform.name().map_err(enumerate_failed)?;
        if !locator.matches_platform(&pname) {
            seen.push(format!("{pname} (skipped)"));
            continue;
        }

        for device in platform.devices().map_err(enumerate_failed)? {
            let dname = device.name().map_err(enumerate_failed)?;
            if !locator.matches_device(&dname) {
                seen.push(format!("{pname}:{dname}"));
                continue;
            }

            let hardware = device.context().map_err(|e| {
                device_not_found(format!(
                    "Unable to open platform '{pname}' device '{dname}' for URL \"{uri}\": {e}"
                ))
            })?;
            info!("Using platform '{pname}' and device '{dname}'");
            return Ok(ResolvedDevice {
                hardware,
                device,
                platform,
                platform_name: pname,
                device_name: dname,
            });
        }
    }

    Err(device_not_found(format!(
        "Unable to find platform:device in URL \"{uri}\", available: [{}]",
        seen.join(", ")
    )))
}
