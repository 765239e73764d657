use crate::{AsValue, Value};

/// Operators available in descriptor expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOpType {
    Multiplication,
    Division,
    Addition,
    Subtraction,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    And,
    Or,
}

/// A declarative expression carried by a query descriptor: filter
/// predicates and annotation expressions. This core never evaluates or
/// compiles expressions, they are opaque payload for the transport's query
/// compiler.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(String),
    Literal(Value),
    BinaryOp {
        op: BinaryOpType,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

macro_rules! impl_binary_op {
    ($name:ident, $op:path) => {
        pub fn $name(self, rhs: impl Into<Expr>) -> Expr {
            Expr::BinaryOp {
                op: $op,
                lhs: Box::new(self),
                rhs: Box::new(rhs.into()),
            }
        }
    };
}

impl Expr {
    /// Reference to a result column of the query.
    pub fn col(name: impl Into<String>) -> Expr {
        Expr::Column(name.into())
    }
    /// Literal value.
    pub fn val(value: impl Into<Value>) -> Expr {
        Expr::Literal(value.into())
    }

    impl_binary_op!(mul, BinaryOpType::Multiplication);
    impl_binary_op!(div, BinaryOpType::Division);
    impl_binary_op!(add, BinaryOpType::Addition);
    impl_binary_op!(sub, BinaryOpType::Subtraction);
    impl_binary_op!(eq, BinaryOpType::Equal);
    impl_binary_op!(ne, BinaryOpType::NotEqual);
    impl_binary_op!(lt, BinaryOpType::Less);
    impl_binary_op!(gt, BinaryOpType::Greater);
    impl_binary_op!(le, BinaryOpType::LessEqual);
    impl_binary_op!(ge, BinaryOpType::GreaterEqual);
    impl_binary_op!(and, BinaryOpType::And);
    impl_binary_op!(or, BinaryOpType::Or);
}

impl<V: AsValue> From<V> for Expr {
    fn from(value: V) -> Self {
        Expr::Literal(value.as_value())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    ASC,
    DESC,
}

/// One ordering term of a query descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Ordered {
    pub expression: Expr,
    pub order: Order,
}
