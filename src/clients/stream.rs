use crate::clients::ClientError;
use async_trait::async_trait;
use backbone_core::{BackboneError, StreamHandler};
use tokio::sync::oneshot;

/// Stream handler that gathers every response and hands the whole list over
/// once the stream ends.
pub struct StreamCollector<T> {
    items: Vec<T>,
    done: Option<oneshot::Sender<Result<Vec<T>, ClientError>>>,
}

impl<T: Send + 'static> StreamCollector<T> {
    /// Returns the handler and the receiver its outcome arrives on.
    ///
    /// The receiver errors if the stream is cancelled before it ends.
    pub fn new() -> (Self, oneshot::Receiver<Result<Vec<T>, ClientError>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                items: Vec::new(),
                done: Some(tx),
            },
            rx,
        )
    }

    fn finish(&mut self, outcome: Result<Vec<T>, ClientError>) {
        if let Some(done) = self.done.take() {
            let _ = done.send(outcome);
        }
    }
}

#[async_trait]
impl<T: Send + 'static> StreamHandler<T> for StreamCollector<T> {
    async fn on_next(&mut self, item: T) {
        self.items.push(item);
    }

    async fn on_error(&mut self, error: BackboneError) {
        self.finish(Err(error.into()));
    }

    async fn on_complete(&mut self) {
        let items = std::mem::take(&mut self.items);
        self.finish(Ok(items));
    }
}
