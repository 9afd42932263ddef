//! Queue module: the two channels between host and worker.
//!
//! - command queue: Controller → WorkerProcess (FIFO, blocking pop on the worker thread)
//! - result queue: TaskRunner threads → ResultWatcher (FIFO per sender, polled);
//!   carries cycle results and run-ended notices
//!
//! Both are unbounded tokio mpsc channels. Senders work from plain threads,
//! the worker pops with `blocking_recv`, the watcher polls with `try_recv`.
//! Nothing else is shared between the two sides.

use tokio::sync::mpsc;

use crate::domain::{Command, RunEvent};

pub type CommandSender = mpsc::UnboundedSender<Command>;
pub type CommandReceiver = mpsc::UnboundedReceiver<Command>;
pub type ResultSender = mpsc::UnboundedSender<RunEvent>;
pub type ResultReceiver = mpsc::UnboundedReceiver<RunEvent>;

pub fn command_queue() -> (CommandSender, CommandReceiver) {
    mpsc::unbounded_channel()
}

pub fn result_queue() -> (ResultSender, ResultReceiver) {
    mpsc::unbounded_channel()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_keep_fifo_order() {
        let (tx, mut rx) = command_queue();
        tx.send(Command::Stop { name: "a".into() }).unwrap();
        tx.send(Command::StopAll).unwrap();
        drop(tx);

        assert_eq!(rx.blocking_recv().map(|c| c.tag()), Some("stop"));
        assert_eq!(rx.blocking_recv().map(|c| c.tag()), Some("stop-all"));
        assert!(rx.blocking_recv().is_none());
    }
}
