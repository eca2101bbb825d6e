//! 宿主图表示中流所用到的那部分值。

use std::fmt;

#[derive(Clone, PartialEq, Debug)]
pub enum Atom {
    /// 以定位符为名字的传感节点，用于打开流。
    Sensory(String),
    /// 普通命名节点，写入时作为入口名。
    Item(String),
    /// 数值向量。
    Number(Vec<f64>),
    /// 有序列表。
    List(Vec<Atom>),
}

impl Atom {
    /// 节点的名字，非节点返回 `None`。
    #[inline]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Sensory(name) | Self::Item(name) => Some(name),
            Self::Number(_) | Self::List(_) => None,
        }
    }

    #[inline]
    pub fn is_node(&self) -> bool {
        self.name().is_some()
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Sensory(name) => write!(f, "(SensoryNode \"{name}\")"),
            Self::Item(name) => write!(f, "(ItemNode \"{name}\")"),
            Self::Number(vals) => {
                write!(f, "(NumberNode")?;
                for v in vals {
                    write!(f, " {v}")?;
                }
                write!(f, ")")
            }
            Self::List(items) => {
                write!(f, "(ListLink")?;
                for item in items {
                    write!(f, " {item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[test]
fn test_display() {
    let atom = Atom::List(vec![
        Atom::Item("vec_mult".into()),
        Atom::Number(vec![0., 1.5]),
    ]);
    assert_eq!(
        atom.to_string(),
        "(ListLink (ItemNode \"vec_mult\") (NumberNode 0 1.5))"
    );
    assert!(!atom.is_node());
    assert_eq!(Atom::Sensory("opencl://:/k.cl".into()).name(), Some("opencl://:/k.cl"));
}
