//! An assignable cell usable as an expression leaf.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    condition::{
        Condition,
        ConditionSet,
    },
    expr::{
        Expr,
        ExprValue,
        IntoExpr,
    },
    runner::Runner,
};

struct ValueInner<T> {
    value: Mutex<T>,
    conditions: ConditionSet,
}

/// A mutable value; `set` re-checks every condition subscribed through a
/// [`Value::expr`] leaf.
#[derive(Clone)]
pub struct Value<T> {
    inner: Arc<ValueInner<T>>,
}

impl<T: ExprValue> Value<T> {
    pub fn new(value: T) -> Self {
        Value {
            inner: Arc::new(ValueInner {
                value: Mutex::new(value),
                conditions: ConditionSet::new(),
            }),
        }
    }

    pub fn get(&self) -> T {
        self.inner.value.lock().clone()
    }

    pub fn set(&self, value: T) {
        *self.inner.value.lock() = value;
        self.inner.conditions.notify_all();
    }

    pub fn expr(&self) -> ValueExpr<T> {
        ValueExpr {
            inner: self.inner.clone(),
            registered: Mutex::new(None),
        }
    }
}

/// Expression leaf over a [`Value`].
pub struct ValueExpr<T> {
    inner: Arc<ValueInner<T>>,
    registered: Mutex<Option<Arc<Condition>>>,
}

impl<T: ExprValue> Expr for ValueExpr<T> {
    type Output = T;

    fn value(&self) -> T {
        self.inner.value.lock().clone()
    }

    fn enable(&self, _owner: &Runner, condition: &Arc<Condition>) {
        self.inner.conditions.add(condition);
        *self.registered.lock() = Some(condition.clone());
    }

    fn disable(&self) {
        if let Some(condition) = self.registered.lock().take() {
            self.inner.conditions.remove(&condition);
        }
    }
}

impl<T: ExprValue> IntoExpr for ValueExpr<T> {
    type Expr = Self;

    fn into_expr(self) -> Self {
        self
    }
}

crate::expr::impl_arith_for!(ValueExpr<T>, [T: ExprValue]);

impl<T: ExprValue> IntoExpr for &Value<T> {
    type Expr = ValueExpr<T>;

    fn into_expr(self) -> ValueExpr<T> {
        self.expr()
    }
}

#[cfg(test)]
mod tests {
    use super::Value;
    use crate::expr::{
        Expr,
        ExprExt,
    };

    #[test]
    fn test_get_set() {
        let value = Value::new(1);
        assert_eq!(value.get(), 1);
        value.set(5);
        assert_eq!(value.get(), 5);
    }

    #[test]
    fn test_expression_sees_updates() {
        let value = Value::new(1);
        let expr = value.expr().ge(10);
        assert!(!expr.value());
        value.set(12);
        assert!(expr.value());
    }

    #[test]
    fn test_arithmetic_over_cell() {
        let value = Value::new(4);
        let expr = (value.expr() * 2).eq(8);
        assert!(expr.value());
    }
}
