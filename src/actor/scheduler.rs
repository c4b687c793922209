//! Command Scheduler: launches commands off the event-loop thread.
//!
//! `schedule` never blocks. Each effect (and each batch member) gets its own
//! short-lived thread; a sequence gets one thread and runs its members in
//! order. Results come back as [`Envelope`]s on the message queue.

use super::messages::{Envelope, Event};
use super::queue::QueueSender;
use crate::cancel::CancelToken;
use crate::command::{Cmd, Task, Tick};
use crate::error::CommandError;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use tracing::{debug, trace, warn};

/// What the loop should do after scheduling a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduled {
    /// Keep running.
    Continue,
    /// The command was, or contained, `Cmd::Quit`.
    Quit,
}

/// Runs commands and feeds their results into the message queue.
pub(crate) struct Scheduler<M> {
    sender: QueueSender<Envelope<M>>,
    token: CancelToken,
}

impl<M: Send + 'static> Scheduler<M> {
    pub(crate) const fn new(sender: QueueSender<Envelope<M>>, token: CancelToken) -> Self {
        Self { sender, token }
    }

    /// Launch `cmd` without waiting for it.
    pub(crate) fn schedule(&self, cmd: Cmd<M>) -> Scheduled {
        match cmd {
            Cmd::None => Scheduled::Continue,
            Cmd::Quit => {
                debug!("quit command scheduled");
                Scheduled::Quit
            }
            Cmd::Batch(members) => {
                trace!(members = members.len(), "scheduling batch");
                let mut outcome = Scheduled::Continue;
                for member in members {
                    if self.schedule(member) == Scheduled::Quit {
                        outcome = Scheduled::Quit;
                    }
                }
                outcome
            }
            Cmd::Message(msg) => {
                post(&self.sender, Envelope::Event(Event::Message(msg)));
                Scheduled::Continue
            }
            Cmd::Terminal(request) => {
                post(&self.sender, Envelope::Terminal(request));
                Scheduled::Continue
            }
            cmd @ (Cmd::Task(_) | Cmd::Tick(_) | Cmd::Sequence(_)) => {
                self.spawn(cmd);
                Scheduled::Continue
            }
        }
    }

    fn spawn(&self, cmd: Cmd<M>) {
        let sender = self.sender.clone();
        let token = self.token.clone();
        let spawned = thread::Builder::new()
            .name("tealoop-cmd".to_string())
            .spawn(move || {
                run_blocking(cmd, &sender, &token);
            });
        if let Err(e) = spawned {
            warn!(error = %e, "could not spawn command thread");
            post(&self.sender, Envelope::Event(Event::Error(CommandError::spawn(&e))));
        }
    }
}

/// Run `cmd` to completion on the current thread.
///
/// Returns `false` when the enclosing sequence must stop: a quit was
/// requested or the program is shutting down.
fn run_blocking<M: Send + 'static>(
    cmd: Cmd<M>,
    sender: &QueueSender<Envelope<M>>,
    token: &CancelToken,
) -> bool {
    match cmd {
        Cmd::None => true,
        Cmd::Quit => {
            post(sender, Envelope::Quit);
            false
        }
        Cmd::Message(msg) => post(sender, Envelope::Event(Event::Message(msg))),
        Cmd::Terminal(request) => post(sender, Envelope::Terminal(request)),
        Cmd::Task(task) => execute_task(task, sender, token),
        Cmd::Tick(tick) => execute_tick(tick, sender, token),
        Cmd::Sequence(members) => {
            for member in members {
                if !run_blocking(member, sender, token) || token.is_cancelled() {
                    return false;
                }
            }
            true
        }
        Cmd::Batch(members) => run_batch_and_wait(members, sender, token),
    }
}

/// A batch inside a sequence: members run concurrently and the sequence
/// resumes once all of them finished.
fn run_batch_and_wait<M: Send + 'static>(
    members: Vec<Cmd<M>>,
    sender: &QueueSender<Envelope<M>>,
    token: &CancelToken,
) -> bool {
    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(members.len());
        for member in members {
            let spawned = thread::Builder::new()
                .name("tealoop-cmd".to_string())
                .spawn_scoped(scope, move || run_blocking(member, sender, token));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    warn!(error = %e, "could not spawn batch member thread");
                    post(sender, Envelope::Event(Event::Error(CommandError::spawn(&e))));
                }
            }
        }
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or(false))
            .fold(true, |keep_going, ok| keep_going && ok)
    })
}

fn execute_task<M>(task: Task<M>, sender: &QueueSender<Envelope<M>>, token: &CancelToken) -> bool {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.run(token)));
    let event = match outcome {
        Ok(Ok(Some(msg))) => Event::Message(msg),
        Ok(Ok(None)) => return true,
        Ok(Err(e)) => {
            debug!(error = %e, "command failed");
            Event::Error(e)
        }
        Err(payload) => {
            let error = CommandError::panicked(payload.as_ref());
            warn!(error = %error, "command panicked");
            Event::Error(error)
        }
    };
    post(sender, Envelope::Event(event))
}

fn execute_tick<M>(tick: Tick<M>, sender: &QueueSender<Envelope<M>>, token: &CancelToken) -> bool {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| tick.run(token)));
    match outcome {
        Ok(Some(msg)) => post(sender, Envelope::Event(Event::Message(msg))),
        Ok(None) => false,
        Err(payload) => post(
            sender,
            Envelope::Event(Event::Error(CommandError::panicked(payload.as_ref()))),
        ),
    }
}

/// Enqueue, noting (but not failing on) a closed queue.
fn post<M>(sender: &QueueSender<Envelope<M>>, envelope: Envelope<M>) -> bool {
    let delivered = sender.enqueue(envelope);
    if !delivered {
        trace!("queue closed, dropping command result");
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::queue::MessageQueue;
    use crate::cancel::CancelSource;
    use crate::command::TerminalCommand;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn setup() -> (MessageQueue<Envelope<u32>>, Scheduler<u32>, CancelSource) {
        let queue = MessageQueue::new();
        let source = CancelSource::new();
        let scheduler = Scheduler::new(queue.sender(), source.token());
        (queue, scheduler, source)
    }

    fn next_message(queue: &MessageQueue<Envelope<u32>>) -> Option<u32> {
        match queue.dequeue()? {
            Envelope::Event(Event::Message(n)) => Some(n),
            other => panic!("unexpected envelope {other:?}"),
        }
    }

    #[test]
    fn test_none_and_quit() {
        let (queue, scheduler, _source) = setup();
        assert_eq!(scheduler.schedule(Cmd::none()), Scheduled::Continue);
        assert_eq!(scheduler.schedule(Cmd::quit()), Scheduled::Quit);
        // Quit itself produces no event.
        assert!(queue.try_dequeue().is_none());
    }

    #[test]
    fn test_quit_inside_batch_is_reported() {
        let (_queue, scheduler, _source) = setup();
        let cmd = Cmd::batch(vec![Cmd::message(1), Cmd::quit()]);
        assert_eq!(scheduler.schedule(cmd), Scheduled::Quit);
    }

    #[test]
    fn test_task_result_is_enqueued() {
        let (queue, scheduler, _source) = setup();
        scheduler.schedule(Cmd::perform(|| 20, |n| n + 1));
        assert_eq!(next_message(&queue), Some(21));
    }

    #[test]
    fn test_task_without_result_posts_nothing() {
        let (queue, scheduler, _source) = setup();
        scheduler.schedule(Cmd::sequence(vec![Cmd::task(|| None), Cmd::message(7)]));
        assert_eq!(next_message(&queue), Some(7));
    }

    #[test]
    fn test_failure_becomes_error_event() {
        let (queue, scheduler, _source) = setup();
        scheduler.schedule(Cmd::try_perform(
            || Err::<u32, _>(CommandError::msg("connection refused")),
            |n| n,
        ));
        match queue.dequeue() {
            Some(Envelope::Event(Event::Error(e))) => {
                assert_eq!(e.message(), "connection refused");
            }
            other => panic!("unexpected envelope {other:?}"),
        }
    }

    #[test]
    fn test_panic_becomes_error_event() {
        let (queue, scheduler, _source) = setup();
        scheduler.schedule(Cmd::task(|| -> Option<u32> { panic!("task exploded") }));
        match queue.dequeue() {
            Some(Envelope::Event(Event::Error(e))) => {
                assert!(e.is_panic());
                assert!(e.message().contains("task exploded"));
            }
            other => panic!("unexpected envelope {other:?}"),
        }
    }

    #[test]
    fn test_batch_yields_every_result_once() {
        let (queue, scheduler, _source) = setup();
        let members = (0..8u32).map(|n| {
            Cmd::perform(
                move || {
                    thread::sleep(Duration::from_millis(u64::from(8 - n)));
                    n
                },
                |n| n,
            )
        });
        scheduler.schedule(Cmd::batch(members));

        let mut results: Vec<u32> = (0..8).filter_map(|_| next_message(&queue)).collect();
        results.sort_unstable();
        assert_eq!(results, (0..8).collect::<Vec<_>>());
        assert!(queue.try_dequeue().is_none());
    }

    #[test]
    fn test_sequence_waits_for_each_result() {
        let (queue, scheduler, _source) = setup();
        let sender = queue.sender();
        let observed = Arc::new(Mutex::new(Vec::new()));

        let members = (0..5u32).map(|n| {
            let sender = sender.clone();
            let observed = Arc::clone(&observed);
            Cmd::perform(
                move || {
                    // Every earlier member's result is already queued.
                    observed.lock().unwrap().push(sender.len());
                    thread::sleep(Duration::from_millis(u64::from(5 - n)));
                    n
                },
                |n| n,
            )
        });
        scheduler.schedule(Cmd::sequence(members));

        // Leave the results queued until the whole sequence has run.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while queue.len() < 5 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }

        let results: Vec<u32> = (0..5).filter_map(|_| next_message(&queue)).collect();
        assert_eq!(results, vec![0, 1, 2, 3, 4]);
        assert_eq!(*observed.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_sequence_waits_for_nested_batch() {
        let (queue, scheduler, _source) = setup();
        let batch = Cmd::batch(vec![
            Cmd::perform(
                || {
                    thread::sleep(Duration::from_millis(20));
                    1
                },
                |n| n,
            ),
            Cmd::perform(|| 2, |n| n),
        ]);
        scheduler.schedule(Cmd::sequence(vec![batch, Cmd::message(3)]));

        let mut first_two: Vec<u32> = (0..2).filter_map(|_| next_message(&queue)).collect();
        first_two.sort_unstable();
        assert_eq!(first_two, vec![1, 2]);
        assert_eq!(next_message(&queue), Some(3));
    }

    #[test]
    fn test_quit_in_sequence_posts_quit_and_stops() {
        let (queue, scheduler, _source) = setup();
        let cmd = Cmd::sequence(vec![Cmd::message(1), Cmd::quit(), Cmd::message(2)]);
        assert_eq!(scheduler.schedule(cmd), Scheduled::Continue);

        assert_eq!(next_message(&queue), Some(1));
        assert!(matches!(queue.dequeue(), Some(Envelope::Quit)));
        thread::sleep(Duration::from_millis(20));
        assert!(queue.try_dequeue().is_none());
    }

    #[test]
    fn test_terminal_requests_keep_their_order() {
        let (queue, scheduler, _source) = setup();
        scheduler.schedule(Cmd::sequence(vec![
            Cmd::enter_alt_screen(),
            Cmd::set_window_title("tealoop"),
        ]));
        assert!(matches!(
            queue.dequeue(),
            Some(Envelope::Terminal(TerminalCommand::EnterAltScreen))
        ));
        assert!(matches!(
            queue.dequeue(),
            Some(Envelope::Terminal(TerminalCommand::SetWindowTitle(ref t))) if t == "tealoop"
        ));
    }

    #[test]
    fn test_results_after_close_are_dropped() {
        let (queue, scheduler, source) = setup();
        scheduler.schedule(Cmd::cancellable(|token| {
            token.sleep(Duration::from_secs(30));
            Ok(Some(1))
        }));
        source.cancel();
        queue.close();
        thread::sleep(Duration::from_millis(20));
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn test_cancelled_tick_posts_nothing() {
        let (queue, scheduler, source) = setup();
        scheduler.schedule(Cmd::tick(Duration::from_secs(30), |_| 1));
        source.cancel();
        thread::sleep(Duration::from_millis(20));
        assert!(queue.try_dequeue().is_none());
    }
}
