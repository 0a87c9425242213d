// This file is part of Nitrogen.
//
// Nitrogen is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Nitrogen is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Nitrogen.  If not, see <http://www.gnu.org/licenses/>.
// A FIFO hand-off between threads.
//
// Any number of threads may post into a queue through a MessagePoster. Exactly one thread, the
// one holding the MessageQueue, drains it: either without blocking, once per frame, via
// process_queue, or by parking on run until someone posts terminate.
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

enum Envelope<T> {
    Message(T),
    Terminate,
}

/// The posting half of a queue. Cheap to clone; safe to use from any thread.
pub struct MessagePoster<T> {
    sender: Sender<Envelope<T>>,
}

impl<T> Clone for MessagePoster<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T> MessagePoster<T> {
    /// Deliver `message` to the queue's drain point. Never blocks. Returns false if the
    /// draining side has gone away.
    pub fn post(&self, message: T) -> bool {
        self.sender.send(Envelope::Message(message)).is_ok()
    }

    /// Ask a thread parked in `run` to return once it reaches this point in the queue.
    pub fn terminate(&self) {
        self.sender.send(Envelope::Terminate).ok();
    }
}

/// The draining half of a queue.
pub struct MessageQueue<T> {
    sender: Sender<Envelope<T>>,
    receiver: Receiver<Envelope<T>>,
}

impl<T> Default for MessageQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MessageQueue<T> {
    pub fn new() -> Self {
        let (sender, receiver) = channel::unbounded();
        Self { sender, receiver }
    }

    pub fn poster(&self) -> MessagePoster<T> {
        MessagePoster {
            sender: self.sender.clone(),
        }
    }

    pub fn post(&self, message: T) {
        // We hold a receiver, so the channel cannot be disconnected.
        self.sender.send(Envelope::Message(message)).ok();
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Hand every message queued right now to `handler`, in posting order, then return the
    /// number handled. Messages posted while draining wait for the next call. Returns
    /// immediately when the queue is empty. Terminate requests are ignored here; they only
    /// matter to `run`.
    pub fn process_queue<F>(&self, mut handler: F) -> usize
    where
        F: FnMut(T),
    {
        let pending = self.receiver.len();
        let mut handled = 0;
        for envelope in self.receiver.try_iter().take(pending) {
            if let Envelope::Message(message) = envelope {
                handler(message);
                handled += 1;
            }
        }
        handled
    }

    /// Wait up to `timeout` for at least one message, then drain the queue as process_queue.
    pub fn process_queue_timeout<F>(&self, timeout: Duration, mut handler: F) -> usize
    where
        F: FnMut(T),
    {
        match self.receiver.recv_timeout(timeout) {
            Ok(Envelope::Message(message)) => {
                handler(message);
                1 + self.process_queue(handler)
            }
            Ok(Envelope::Terminate) => self.process_queue(handler),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Block, handing each message to `handler` as it arrives, until a terminate request is
    /// dequeued. Messages posted before the terminate request are all handled first.
    pub fn run<F>(&self, mut handler: F)
    where
        F: FnMut(T),
    {
        while let Ok(envelope) = self.receiver.recv() {
            match envelope {
                Envelope::Message(message) => handler(message),
                Envelope::Terminate => {
                    log::trace!("message queue terminated with {} pending", self.len());
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let queue = MessageQueue::new();
        for i in 0..10 {
            queue.post(i);
        }
        let mut seen = Vec::new();
        assert_eq!(queue.process_queue(|m| seen.push(m)), 10);
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_queue_returns_immediately() {
        let queue = MessageQueue::<u32>::new();
        assert_eq!(queue.process_queue(|_| panic!("no messages")), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_only_drains_what_is_queued() {
        let queue = MessageQueue::new();
        let poster = queue.poster();
        queue.post(1);
        let mut seen = Vec::new();
        queue.process_queue(|m| seen.push(m));
        poster.post(2);
        assert_eq!(seen, vec![1]);
        queue.process_queue(|m| seen.push(m));
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn test_posts_from_the_handler_wait() {
        let queue = MessageQueue::new();
        let poster = queue.poster();
        queue.post(0);
        queue.post(1);
        let mut seen = Vec::new();
        let handled = queue.process_queue(|m| {
            seen.push(m);
            poster.post(m + 10);
        });
        assert_eq!(handled, 2);
        assert_eq!(seen, vec![0, 1]);
        assert_eq!(queue.len(), 2);

        seen.clear();
        queue.process_queue(|m| seen.push(m));
        assert_eq!(seen, vec![10, 11]);
    }
}
