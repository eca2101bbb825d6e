use crate::{execution_failed, invalid_request, Atom, KernelArg, StreamError};

/// 入口参数表中的一个位置。
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ArgSlot {
    /// 输出存储区。
    Output,
    /// 第 i 个输入存储区。
    Input(usize),
    /// 标量 `vec_dim`，以 `u64` 传递。
    Dim,
}

/// 入口参数的位置约定。
///
/// 每个内核都必须按 `输出, 输入..., 维度` 的顺序声明参数。
/// 发射前只核对参数个数。
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ArgSchema(Vec<ArgSlot>);

impl ArgSchema {
    pub fn positional(inputs: usize) -> Self {
        let mut slots = Vec::with_capacity(inputs + 2);
        slots.push(ArgSlot::Output);
        slots.extend((0..inputs).map(ArgSlot::Input));
        slots.push(ArgSlot::Dim);
        Self(slots)
    }

    #[inline]
    pub fn slots(&self) -> &[ArgSlot] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn check(&self, kernel: &str, num_args: usize) -> Result<(), StreamError> {
        if num_args == self.len() {
            Ok(())
        } else {
            Err(execution_failed(format!(
                "kernel \"{kernel}\" takes {num_args} arguments, {} expected (output, {} inputs, vec_dim)",
                self.len(),
                self.len() - 2,
            )))
        }
    }

    pub fn bind<'a, B>(&self, output: &'a B, inputs: &'a [B], dim: u64) -> Vec<KernelArg<'a, B>> {
        self.0
            .iter()
            .map(|slot| match *slot {
                ArgSlot::Output => KernelArg::Buffer(output),
                ArgSlot::Input(i) => KernelArg::Buffer(&inputs[i]),
                ArgSlot::Dim => KernelArg::Scalar(dim),
            })
            .collect()
    }
}

/// 一次内核调用：入口名加若干输入向量。
#[derive(Clone, PartialEq, Debug)]
pub struct InvocationRequest {
    kernel: String,
    inputs: Vec<Vec<f64>>,
    schema: ArgSchema,
}

impl InvocationRequest {
    pub fn new(kernel: impl Into<String>, inputs: Vec<Vec<f64>>) -> Result<Self, StreamError> {
        let kernel = kernel.into();
        if kernel.is_empty() {
            return Err(invalid_request("Expecting a kernel name, got an empty name"));
        }
        if inputs.is_empty() {
            return Err(invalid_request(format!(
                "Expecting at least one vector for kernel \"{kernel}\""
            )));
        }
        if let Some(i) = inputs.iter().position(Vec::is_empty) {
            return Err(invalid_request(format!(
                "Input vector #{i} for kernel \"{kernel}\" is empty"
            )));
        }
        let schema = ArgSchema::positional(inputs.len());
        Ok(Self {
            kernel,
            inputs,
            schema,
        })
    }

    #[inline]
    pub fn kernel(&self) -> &str {
        &self.kernel
    }

    #[inline]
    pub fn inputs(&self) -> &[Vec<f64>] {
        &self.inputs
    }

    #[inline]
    pub fn schema(&self) -> &ArgSchema {
        &self.schema
    }

    /// 最短输入的长度，较长的输入会被截断到这个长度。
    #[inline]
    pub fn vec_dim(&self) -> usize {
        self.inputs.iter().map(Vec::len).min().unwrap_or(0)
    }
}

impl TryFrom<&Atom> for InvocationRequest {
    type Error = StreamError;

    fn try_from(value: &Atom) -> Result<Self, Self::Error> {
        let Atom::List(items) = value else {
            return Err(invalid_request(format!("Unknown data type: got {value}")));
        };
        let [name, vecs @ ..] = &items[..] else {
            return Err(invalid_request(format!("Expecting a kernel name, got {value}")));
        };
        let Some(name) = name.name() else {
            return Err(invalid_request(format!(
                "Expecting Atom with kernel name, got {name}"
            )));
        };
        let inputs = vecs
            .iter()
            .map(|item| match item {
                Atom::Number(v) => Ok(v.clone()),
                _ => Err(invalid_request(format!(
                    "Expecting a numeric vector, got {item}"
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(name, inputs)
    }
}

#[cfg(test)]
mod test {
    use super::{ArgSchema, ArgSlot, InvocationRequest};
    use crate::{Atom, KernelArg, StreamErrorKind};

    #[test]
    fn test_vec_dim_is_shortest() {
        let req = InvocationRequest::new(
            "vec_mult",
            vec![vec![1., 2., 3., 4., 5.], vec![1., 1., 1.]],
        )
        .unwrap();
        assert_eq!(req.vec_dim(), 3);
    }

    #[test]
    fn test_from_atom() {
        let atom = Atom::List(vec![
            Atom::Item("vec_mult".into()),
            Atom::Number(vec![0., 1., 2., 3.]),
            Atom::Number(vec![1., 1.5, 2., 2.5]),
        ]);
        let req = InvocationRequest::try_from(&atom).unwrap();
        assert_eq!(req.kernel(), "vec_mult");
        assert_eq!(req.inputs().len(), 2);
        assert_eq!(req.schema(), &ArgSchema::positional(2));
    }

    #[test]
    fn test_bad_shapes() {
        let bad = [
            Atom::Item("vec_mult".into()),
            Atom::List(vec![]),
            Atom::List(vec![Atom::Item("vec_mult".into())]),
            Atom::List(vec![Atom::Number(vec![1.]), Atom::Number(vec![1.])]),
            Atom::List(vec![Atom::Item("k".into()), Atom::Item("x".into())]),
            Atom::List(vec![Atom::Item("k".into()), Atom::Number(vec![])]),
            Atom::List(vec![Atom::Item("".into()), Atom::Number(vec![1.])]),
        ];
        for atom in &bad {
            let err = InvocationRequest::try_from(atom).unwrap_err();
            assert_eq!(err.kind, StreamErrorKind::InvalidRequest, "{atom}");
        }
    }

    #[test]
    fn test_schema() {
        let schema = ArgSchema::positional(2);
        assert_eq!(
            schema.slots(),
            [ArgSlot::Output, ArgSlot::Input(0), ArgSlot::Input(1), ArgSlot::Dim]
        );
        assert!(schema.check("vec_mult", 4).is_ok());
        let err = schema.check("vec_mult", 3).unwrap_err();
        assert_eq!(err.kind, StreamErrorKind::Execution);
        assert!(err.info.contains("vec_mult"));

        let (out, inputs) = (10, [20, 30]);
        let args = schema.bind(&out, &inputs, 7);
        assert!(matches!(args[0], KernelArg::Buffer(&10)));
        assert!(matches!(args[1], KernelArg::Buffer(&20)));
        assert!(matches!(args[2], KernelArg::Buffer(&30)));
        assert!(matches!(args[3], KernelArg::Scalar(7)));
    }
}
