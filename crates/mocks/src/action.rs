//! What a matched expectation does when called.

/// An action performed on a call: produces the return value, possibly with
/// side effects on captured state.
pub struct Action<A, R> {
    perform: Box<dyn FnMut(&A) -> R + Send>,
}

impl<A, R> Action<A, R> {
    pub(crate) fn perform(&mut self, args: &A) -> R {
        (self.perform)(args)
    }
}

/// Return a fixed value.
pub fn return_value<A, R: Clone + Send + 'static>(value: R) -> Action<A, R> {
    Action {
        perform: Box::new(move |_| value.clone()),
    }
}

/// Return `R::default()`.
pub fn return_default<A, R: Default>() -> Action<A, R>
where
    A: 'static,
    R: 'static,
{
    Action {
        perform: Box::new(|_| R::default()),
    }
}

/// Run an arbitrary closure over the call arguments.
pub fn invoke<A, R>(f: impl FnMut(&A) -> R + Send + 'static) -> Action<A, R> {
    Action {
        perform: Box::new(f),
    }
}
