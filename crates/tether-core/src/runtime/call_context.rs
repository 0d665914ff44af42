//! Call context bridging the runtime stack and native Rust functions.

use std::fmt;
use std::rc::Rc;

use crate::RuntimeError;
use crate::convert::{FromValue, IntoValue};

use super::{State, Value};

/// Context for one native call.
///
/// The context is a window over the runtime stack. Positions are 1-based and
/// count from the first argument of the current frame; values pushed by the
/// function land above the arguments, and the function reports how many of
/// the topmost values are its results.
///
/// ```ignore
/// fn add(ctx: &mut CallContext<'_>) -> Result<usize, RuntimeError> {
///     let a = ctx.check_int(1)?;
///     let b = ctx.check_int(2)?;
///     ctx.push(a + b)?;
///     Ok(1)
/// }
/// ```
pub struct CallContext<'s> {
    state: &'s mut State,
    /// Stack index of argument 1.
    base: usize,
}

impl<'s> CallContext<'s> {
    pub(crate) fn new(state: &'s mut State, base: usize) -> Self {
        Self { state, base }
    }

    /// Number of values in the frame, arguments plus anything pushed since.
    pub fn arg_count(&self) -> usize {
        self.state.stack.len().saturating_sub(self.base)
    }

    /// Get the value at a 1-based position.
    pub fn arg(&self, position: usize) -> Result<&Value, RuntimeError> {
        let count = self.arg_count();
        if position == 0 || position > count {
            return Err(RuntimeError::ArgumentOutOfBounds {
                index: position,
                count,
            });
        }
        Ok(&self.state.stack[self.base + position - 1])
    }

    /// Get the value at a position, or `nil` past the end of the frame.
    pub fn arg_or_nil(&self, position: usize) -> Value {
        self.arg(position).cloned().unwrap_or_default()
    }

    /// Get a typed argument value.
    ///
    /// A missing argument converts like `nil`, so the error names the
    /// expected type rather than the frame size.
    pub fn arg_as<T: FromValue>(&self, position: usize) -> Result<T, RuntimeError> {
        T::from_value(&self.arg_or_nil(position))
            .map_err(|source| RuntimeError::Conversion { position, source })
    }

    pub fn check_int(&self, position: usize) -> Result<i64, RuntimeError> {
        self.arg_as(position)
    }

    pub fn check_number(&self, position: usize) -> Result<f64, RuntimeError> {
        self.arg_as(position)
    }

    pub fn check_str(&self, position: usize) -> Result<Rc<str>, RuntimeError> {
        self.arg_as(position)
    }

    /// Remove the value at a position, shifting later values down.
    pub fn remove(&mut self, position: usize) -> Result<Value, RuntimeError> {
        self.arg(position)?;
        Ok(self.state.stack.remove(self.base + position - 1))
    }

    /// Detach argument 1 from the frame.
    ///
    /// Later arguments move down one position, in order. The detached value
    /// stays on the stack below the frame, so it remains a collector root
    /// until the call returns.
    pub fn shift(&mut self) -> Result<Value, RuntimeError> {
        let first = self.arg(1)?.clone();
        self.base += 1;
        Ok(first)
    }

    /// Push a result value.
    pub fn push<T: IntoValue>(&mut self, value: T) -> Result<(), RuntimeError> {
        self.state.push(value.into_value())
    }

    pub fn state(&self) -> &State {
        self.state
    }

    pub fn state_mut(&mut self) -> &mut State {
        self.state
    }
}

impl fmt::Debug for CallContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("arg_count", &self.arg_count())
            .field("base", &self.base)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{ConversionError, NativeFn, RuntimeError, State, Value};

    fn call_with(
        args: &[Value],
        f: impl Fn(&mut super::CallContext<'_>) -> Result<usize, RuntimeError> + 'static,
    ) -> Result<Vec<Value>, RuntimeError> {
        let mut state = State::new();
        let func = state.create_function(NativeFn::new(f));
        state.call(&Value::Function(func), args)
    }

    #[test]
    fn arg_count_and_positions() {
        let results = call_with(&[Value::Int(1), Value::Int(2), Value::Int(3)], |ctx| {
            assert_eq!(ctx.arg_count(), 3);
            assert_eq!(ctx.arg(1)?, &Value::Int(1));
            assert_eq!(ctx.arg(3)?, &Value::Int(3));
            Ok(0)
        })
        .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn out_of_bounds_positions() {
        let err = call_with(&[Value::Int(1)], |ctx| {
            ctx.arg(0)?;
            Ok(0)
        })
        .unwrap_err();
        assert_eq!(err, RuntimeError::ArgumentOutOfBounds { index: 0, count: 1 });

        let err = call_with(&[Value::Int(1)], |ctx| {
            ctx.arg(5)?;
            Ok(0)
        })
        .unwrap_err();
        assert_eq!(err, RuntimeError::ArgumentOutOfBounds { index: 5, count: 1 });
    }

    #[test]
    fn typed_args() {
        let results = call_with(&[Value::Int(40), Value::Float(2.5), Value::str("hi")], |ctx| {
            let a = ctx.check_int(1)?;
            let b = ctx.check_number(2)?;
            let s = ctx.check_str(3)?;
            ctx.push(a as f64 + b)?;
            ctx.push(&*s)?;
            Ok(2)
        })
        .unwrap();
        assert_eq!(results, vec![Value::Float(42.5), Value::str("hi")]);
    }

    #[test]
    fn missing_arg_reports_expected_type() {
        let err = call_with(&[], |ctx| {
            ctx.check_number(1)?;
            Ok(0)
        })
        .unwrap_err();
        assert_eq!(
            err,
            RuntimeError::Conversion {
                position: 1,
                source: ConversionError::TypeMismatch {
                    expected: "number",
                    actual: "nil",
                },
            }
        );
    }

    #[test]
    fn shift_preserves_order() {
        let results = call_with(&[Value::str("self"), Value::Int(1), Value::Int(2)], |ctx| {
            assert_eq!(ctx.shift()?, Value::str("self"));
            assert_eq!(ctx.arg_count(), 2);
            let a = ctx.check_int(1)?;
            let b = ctx.check_int(2)?;
            ctx.push(a)?;
            ctx.push(b)?;
            Ok(2)
        })
        .unwrap();
        assert_eq!(results, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn remove_shifts_later_values() {
        let results = call_with(&[Value::Int(1), Value::Int(2), Value::Int(3)], |ctx| {
            assert_eq!(ctx.remove(2)?, Value::Int(2));
            assert_eq!(ctx.arg(2)?, &Value::Int(3));
            Ok(2)
        })
        .unwrap();
        assert_eq!(results, vec![Value::Int(1), Value::Int(3)]);
    }

    #[test]
    fn debug_output() {
        call_with(&[Value::Int(1)], |ctx| {
            let debug = format!("{:?}", ctx);
            assert!(debug.contains("CallContext"));
            assert!(debug.contains("arg_count: 1"));
            Ok(0)
        })
        .unwrap();
    }
}
