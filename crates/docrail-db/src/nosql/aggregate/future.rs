//! Future returned by aggregate execution

use bson::Document;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;

use crate::nosql::error::{NoSQLError, Result};

/// Callback form of aggregate completion
///
/// Receives the documents on success or the data source error on failure.
/// It runs exactly once, on the runtime worker executing the aggregation.
pub type AggregateCallback = Box<dyn FnOnce(std::result::Result<&[Document], &NoSQLError>) + Send + 'static>;

enum State {
	Spawned(JoinHandle<Result<Vec<Document>>>),
	Ready(Option<Result<Vec<Document>>>),
}

/// Pending result of [`Aggregate::exec`](super::Aggregate::exec)
///
/// The execution is already running when this value is returned. Awaiting it
/// yields the result; dropping it detaches the execution, which still runs to
/// completion (and still invokes a callback passed to
/// [`exec_with`](super::Aggregate::exec_with)).
#[must_use = "dropping the future detaches the aggregation; await it to observe the result"]
pub struct AggregateFuture {
	state: State,
}

impl AggregateFuture {
	pub(crate) fn spawned(handle: JoinHandle<Result<Vec<Document>>>) -> Self {
		Self {
			state: State::Spawned(handle),
		}
	}

	pub(crate) fn ready(result: Result<Vec<Document>>) -> Self {
		Self {
			state: State::Ready(Some(result)),
		}
	}

	/// Returns `true` once the underlying execution has finished
	pub fn is_finished(&self) -> bool {
		match &self.state {
			State::Spawned(handle) => handle.is_finished(),
			State::Ready(_) => true,
		}
	}
}

impl Future for AggregateFuture {
	type Output = Result<Vec<Document>>;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let this = self.get_mut();
		match &mut this.state {
			State::Spawned(handle) => match Pin::new(handle).poll(cx) {
				Poll::Ready(Ok(result)) => Poll::Ready(result),
				Poll::Ready(Err(err)) => Poll::Ready(Err(NoSQLError::ExecutionError(format!(
					"aggregate task failed: {}",
					err
				)))),
				Poll::Pending => Poll::Pending,
			},
			State::Ready(result) => Poll::Ready(result.take().unwrap_or_else(|| {
				Err(NoSQLError::InvalidOperation(
					"AggregateFuture polled after completion".to_string(),
				))
			})),
		}
	}
}

impl fmt::Debug for AggregateFuture {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AggregateFuture")
			.field("finished", &self.is_finished())
			.finish()
	}
}
