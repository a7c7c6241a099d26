//! FIFO job queue backed by a single actor.
//!
//! Callers on any task can enqueue concurrently; the actor mailbox
//! serializes every mutation, so the queue itself needs no locking. There is
//! one consumer (the worker), but parked dequeue requests are kept in arrival
//! order so a second consumer would not break anything.

use std::collections::VecDeque;

use invite_core::Job;
use ractor::rpc::CallResult;
use ractor::{Actor, ActorProcessingErr, ActorRef, MessagingErr, RpcReplyPort};

use crate::messages::{QueueError, QueueMessage};

/// State for the queue actor.
#[derive(Default)]
pub struct QueueActorState {
    /// Jobs waiting for the worker, head first.
    pending: VecDeque<Job>,
    /// Dequeue requests parked while the queue was empty.
    waiters: VecDeque<RpcReplyPort<Option<Job>>>,
    /// Once set, empty dequeues reply `None` instead of parking.
    closed: bool,
}

impl QueueActorState {
    /// Hand a job to the oldest live waiter, or append it to the tail.
    fn push_back(&mut self, job: Job) {
        if let Some(job) = self.hand_off(job) {
            self.pending.push_back(job);
        }
    }

    /// Returns the job back if no waiter could take it.
    fn hand_off(&mut self, mut job: Job) -> Option<Job> {
        while let Some(waiter) = self.waiters.pop_front() {
            if waiter.is_closed() {
                continue;
            }
            match waiter.send(Some(job)) {
                Ok(()) => return None,
                // The dequeue was cancelled between the check and the send.
                Err(MessagingErr::SendErr(Some(returned))) => job = returned,
                Err(_) => {
                    tracing::warn!("Queue hand-off failed without returning the job");
                    return None;
                }
            }
        }
        Some(job)
    }

    fn dequeue(&mut self, reply: RpcReplyPort<Option<Job>>) {
        if let Some(job) = self.pending.pop_front() {
            if let Err(MessagingErr::SendErr(Some(job))) = reply.send(Some(job)) {
                // Requester went away; keep the job at the head.
                self.pending.push_front(job);
            }
        } else if self.closed {
            let _ = reply.send(None);
        } else {
            self.waiters.push_back(reply);
        }
    }

    fn close(&mut self) {
        self.closed = true;
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(None);
        }
    }
}

/// Queue actor that owns pending join jobs.
pub struct QueueActor;

impl Actor for QueueActor {
    type Msg = QueueMessage;
    type State = QueueActorState;
    type Arguments = ();

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        _args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::debug!("Starting job queue actor");
        Ok(QueueActorState::default())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if !state.pending.is_empty() {
            tracing::info!(
                "Job queue stopped with {} unprocessed jobs",
                state.pending.len()
            );
        }
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            QueueMessage::Enqueue { job } => state.push_back(*job),

            QueueMessage::Dequeue { reply } => state.dequeue(reply),

            QueueMessage::Close => state.close(),

            QueueMessage::Len { reply } => {
                let _ = reply.send(state.pending.len());
            }

            QueueMessage::Shutdown => {
                tracing::debug!("Shutting down job queue actor");
                myself.stop(None);
            }
        }

        Ok(())
    }
}

/// Cloneable handle to the queue actor.
#[derive(Clone)]
pub struct JobQueue {
    actor: ActorRef<QueueMessage>,
}

impl JobQueue {
    /// Spawn a new, empty queue actor.
    pub async fn spawn() -> Result<(Self, tokio::task::JoinHandle<()>), QueueError> {
        let (actor, handle) = Actor::spawn(None, QueueActor, ())
            .await
            .map_err(|e| QueueError::Spawn(e.to_string()))?;
        Ok((Self { actor }, handle))
    }

    /// Append a job to the tail. Never waits.
    pub fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        self.actor
            .send_message(QueueMessage::Enqueue { job: Box::new(job) })
            .map_err(|e| QueueError::Unavailable(e.to_string()))
    }

    /// Wait for the head of the queue.
    ///
    /// Returns `Ok(None)` once the queue has been closed and drained. Dropping
    /// the returned future before it completes does not lose a job.
    pub async fn dequeue(&self) -> Result<Option<Job>, QueueError> {
        match ractor::rpc::call(&self.actor, |reply| QueueMessage::Dequeue { reply }, None).await
        {
            Ok(CallResult::Success(job)) => Ok(job),
            Ok(CallResult::Timeout) => Err(QueueError::Unavailable("dequeue timed out".into())),
            Ok(CallResult::SenderError) => {
                Err(QueueError::Unavailable("queue dropped the request".into()))
            }
            Err(e) => Err(QueueError::Unavailable(e.to_string())),
        }
    }

    /// Stop parking dequeues; waiters and later dequeues on an empty queue get `None`.
    pub fn close(&self) -> Result<(), QueueError> {
        self.actor
            .send_message(QueueMessage::Close)
            .map_err(|e| QueueError::Unavailable(e.to_string()))
    }

    /// Number of jobs currently waiting.
    pub async fn len(&self) -> Result<usize, QueueError> {
        match ractor::rpc::call(&self.actor, |reply| QueueMessage::Len { reply }, None).await {
            Ok(CallResult::Success(len)) => Ok(len),
            Ok(_) => Err(QueueError::Unavailable("queue dropped the request".into())),
            Err(e) => Err(QueueError::Unavailable(e.to_string())),
        }
    }

    /// Stop the actor. Jobs still queued are dropped.
    pub fn shutdown(&self) {
        let _ = self.actor.send_message(QueueMessage::Shutdown);
    }
}
