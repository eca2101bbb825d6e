use thiserror::Error;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StreamErrorKind {
    MalformedLocator,
    DeviceNotFound,
    Io,
    Compile,
    Execution,
    InvalidRequest,
    NotReady,
    Closed,
}

#[derive(Error, Clone, Debug)]
#[error("{kind:?}: {info}")]
pub struct StreamError {
    pub kind: StreamErrorKind,
    pub info: String,
}

pub(super) mod functions {
    use super::{StreamError, StreamErrorKind::*};

    macro_rules! builder {
        ($ty:ident: $name:ident $kind:expr) => {
            #[inline]
            pub fn $name(info: impl Into<String>) -> $ty {
                $ty {
                    kind: $kind,
                    info: info.into(),
                }
            }
        };
    }

    builder!(StreamError: malformed_locator MalformedLocator);
    builder!(StreamError: device_not_found  DeviceNotFound  );
    builder!(StreamError: io_failed         Io              );
    builder!(StreamError: compile_failed    Compile         );
    builder!(StreamError: execution_failed  Execution       );
    builder!(StreamError: invalid_request   InvalidRequest  );
    builder!(StreamError: not_ready         NotReady        );
    builder!(StreamError: closed            Closed          );
}

#[test]
fn test_display() {
    let e = functions::not_ready("opencl://:/k.cl: nothing submitted");
    assert_eq!(e.kind, StreamErrorKind::NotReady);
    assert_eq!(e.to_string(), "NotReady: opencl://:/k.cl: nothing submitted");
}
