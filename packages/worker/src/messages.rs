//! Message types for actor communication.

use invite_core::Job;
use ractor::RpcReplyPort;

/// Messages for the QueueActor.
#[derive(Debug)]
pub enum QueueMessage {
    /// Append a job to the tail of the queue.
    Enqueue { job: Box<Job> },

    /// Take the head of the queue, parking the reply until a job arrives.
    ///
    /// Replies `None` once the queue is closed and empty.
    Dequeue { reply: RpcReplyPort<Option<Job>> },

    /// Stop parking dequeue requests. Remaining jobs can still be drained.
    Close,

    /// Number of jobs waiting in the queue.
    Len { reply: RpcReplyPort<usize> },

    /// Stop the queue actor.
    Shutdown,
}

/// Error type for queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queue unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to spawn queue: {0}")]
    Spawn(String),
}
