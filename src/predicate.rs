//! Predicate trees
//!
//! A small expression tree for `WHERE`-style conditions. The same tree can be
//! rendered as query text with `?` placeholders or evaluated against a row.
//!
//! ```text
//!            And
//!           /   \
//!       Equal    Equal
//!       /  \     /   \
//!  Field  ?   Field  Terminal
//! ```

use std::fmt;

use crate::error::{Error, Result};

/// Scalar value of a field, a parameter or a literal
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::Text(a), Value::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => f.write_str(if *b { "1" } else { "0" }),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// Node of a predicate tree
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    And(Box<Predicate>, Box<Predicate>),
    Equal(Box<Predicate>, Box<Predicate>),
    Field(String),
    Placeholder,
    Terminal(Value),
}

/// Operation over a predicate tree, one method per node kind
pub trait Visitor {
    type Output;

    fn visit_and(&mut self, left: &Predicate, right: &Predicate) -> Self::Output;
    fn visit_equal(&mut self, left: &Predicate, right: &Predicate) -> Self::Output;
    fn visit_field(&mut self, name: &str) -> Self::Output;
    fn visit_placeholder(&mut self) -> Self::Output;
    fn visit_terminal(&mut self, value: &Value) -> Self::Output;
}

impl Predicate {
    pub fn field(name: impl Into<String>) -> Self {
        Predicate::Field(name.into())
    }

    pub fn placeholder() -> Self {
        Predicate::Placeholder
    }

    pub fn terminal(value: impl Into<Value>) -> Self {
        Predicate::Terminal(value.into())
    }

    /// `left = right`
    pub fn equal(left: Predicate, right: Predicate) -> Self {
        Predicate::Equal(Box::new(left), Box::new(right))
    }

    /// `self AND other`
    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(Box::new(self), Box::new(other))
    }

    /// Dispatch to the visitor method matching this node
    pub fn accept<V: Visitor>(&self, visitor: &mut V) -> V::Output {
        match self {
            Predicate::And(left, right) => visitor.visit_and(left, right),
            Predicate::Equal(left, right) => visitor.visit_equal(left, right),
            Predicate::Field(name) => visitor.visit_field(name),
            Predicate::Placeholder => visitor.visit_placeholder(),
            Predicate::Terminal(value) => visitor.visit_terminal(value),
        }
    }

    /// Render as query text, returning the text and the number of placeholders
    pub fn render(&self) -> (String, usize) {
        let mut renderer = Renderer::default();
        let text = self.accept(&mut renderer);
        (text, renderer.placeholders)
    }

    /// Evaluate against a row
    ///
    /// `row` resolves field names; placeholders take `params` in order.
    pub fn evaluate<F>(&self, row: F, params: &[Value]) -> Result<bool>
    where
        F: Fn(&str) -> Option<Value>,
    {
        let mut evaluator = Evaluator {
            row,
            params,
            next_param: 0,
        };
        match self.accept(&mut evaluator)? {
            Value::Bool(b) => Ok(b),
            other => Err(Error::Predicate(format!("not a condition: {}", other))),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render().0)
    }
}

#[derive(Default)]
struct Renderer {
    placeholders: usize,
}

impl Visitor for Renderer {
    type Output = String;

    fn visit_and(&mut self, left: &Predicate, right: &Predicate) -> String {
        let left = left.accept(self);
        let right = right.accept(self);
        format!("{} AND {}", left, right)
    }

    fn visit_equal(&mut self, left: &Predicate, right: &Predicate) -> String {
        let left = left.accept(self);
        let right = right.accept(self);
        format!("{}={}", left, right)
    }

    fn visit_field(&mut self, name: &str) -> String {
        name.to_string()
    }

    fn visit_placeholder(&mut self) -> String {
        self.placeholders += 1;
        "?".to_string()
    }

    fn visit_terminal(&mut self, value: &Value) -> String {
        value.to_string()
    }
}

struct Evaluator<'a, F> {
    row: F,
    params: &'a [Value],
    next_param: usize,
}

impl<F> Visitor for Evaluator<'_, F>
where
    F: Fn(&str) -> Option<Value>,
{
    type Output = Result<Value>;

    fn visit_and(&mut self, left: &Predicate, right: &Predicate) -> Result<Value> {
        // Placeholders are numbered left to right, so both sides are visited
        let left = condition(left.accept(self)?)?;
        let right = condition(right.accept(self)?)?;
        Ok(Value::Bool(left && right))
    }

    fn visit_equal(&mut self, left: &Predicate, right: &Predicate) -> Result<Value> {
        let left = left.accept(self)?;
        let right = right.accept(self)?;
        Ok(Value::Bool(left == right))
    }

    fn visit_field(&mut self, name: &str) -> Result<Value> {
        (self.row)(name).ok_or_else(|| Error::Predicate(format!("unknown field '{}'", name)))
    }

    fn visit_placeholder(&mut self) -> Result<Value> {
        let index = self.next_param;
        self.next_param += 1;
        self.params
            .get(index)
            .cloned()
            .ok_or_else(|| Error::Predicate(format!("missing parameter {}", index + 1)))
    }

    fn visit_terminal(&mut self, value: &Value) -> Result<Value> {
        Ok(value.clone())
    }
}

fn condition(value: Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(Error::Predicate(format!("not a condition: {}", other))),
    }
}
