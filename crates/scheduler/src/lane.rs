use std::collections::VecDeque;

use tokio::sync::oneshot;

use crate::model::{EnforcementTask, LaneState, TaskPhase};

/// A task released by [`Lane::admit`]. `turn` fires once every earlier task on
/// the lane has completed.
#[derive(Debug)]
pub struct Admitted {
    pub seq: u64,
    pub task: EnforcementTask,
    pub turn: oneshot::Receiver<()>,
}

#[derive(Debug)]
struct Slot {
    seq: u64,
    invalidates: bool,
    phase: TaskPhase,
    turn: Option<oneshot::Sender<()>>,
}

/// Admission state of one entity key.
///
/// `waiting` holds tasks in submission order that have not started; `running`
/// holds started tasks in submission order. A task starts once it heads
/// `waiting` and the task started right before it does not invalidate the
/// cache. Only the head of `running` may commit.
#[derive(Debug, Default)]
pub struct Lane {
    waiting: VecDeque<(u64, EnforcementTask)>,
    running: VecDeque<Slot>,
}

impl Lane {
    pub fn push(&mut self, seq: u64, task: EnforcementTask) {
        self.waiting.push_back((seq, task));
    }

    pub fn admit(&mut self) -> Vec<Admitted> {
        let mut admitted = Vec::new();
        while !self.waiting.is_empty() {
            if self.running.back().map(|slot| slot.invalidates).unwrap_or(false) {
                break;
            }
            let Some((seq, task)) = self.waiting.pop_front() else {
                break;
            };
            let (tx, rx) = oneshot::channel();
            self.running.push_back(Slot {
                seq,
                invalidates: task.invalidates_cache(),
                phase: TaskPhase::Preparing,
                turn: Some(tx),
            });
            admitted.push(Admitted {
                seq,
                task,
                turn: rx,
            });
        }
        self.release_turn();
        admitted
    }

    fn release_turn(&mut self) {
        if let Some(front) = self.running.front_mut() {
            if let Some(turn) = front.turn.take() {
                let _ = turn.send(());
            }
        }
    }

    pub fn mark_committing(&mut self, seq: u64) {
        if let Some(slot) = self.running.iter_mut().find(|slot| slot.seq == seq) {
            slot.phase = TaskPhase::Committing;
        }
    }

    /// Removes a finished task. Call [`Lane::admit`] afterwards to hand out
    /// the next turn and start waiting tasks.
    pub fn complete(&mut self, seq: u64) -> bool {
        match self.running.iter().position(|slot| slot.seq == seq) {
            Some(index) => {
                self.running.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn state(&self) -> LaneState {
        if self
            .running
            .iter()
            .any(|slot| slot.phase == TaskPhase::Committing)
        {
            LaneState::Dispatching
        } else if self.running.is_empty() && self.waiting.is_empty() {
            LaneState::Idle
        } else {
            LaneState::Preparing
        }
    }

    pub fn pending(&self) -> usize {
        self.waiting.len() + self.running.len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core_types::EntityKey;

    fn task(invalidates: bool) -> EnforcementTask {
        EnforcementTask::exclusive(EntityKey::thing("org.example:t"), invalidates, async {
            Ok::<(), warden_errors::prelude::ErrorObj>(())
        })
    }

    fn seqs(admitted: &[Admitted]) -> Vec<u64> {
        admitted.iter().map(|a| a.seq).collect()
    }

    #[test]
    fn reads_start_together_and_commit_in_order() {
        let mut lane = Lane::default();
        lane.push(1, task(false));
        lane.push(2, task(false));
        let mut admitted = lane.admit();
        assert_eq!(seqs(&admitted), vec![1, 2]);
        assert!(admitted[0].turn.try_recv().is_ok());
        assert!(admitted[1].turn.try_recv().is_err());

        assert!(lane.complete(1));
        assert!(lane.admit().is_empty());
        assert!(admitted[1].turn.try_recv().is_ok());
    }

    #[test]
    fn invalidating_task_blocks_later_starts() {
        let mut lane = Lane::default();
        lane.push(1, task(false));
        lane.push(2, task(true));
        lane.push(3, task(false));
        lane.push(4, task(true));

        let mut first = lane.admit();
        assert_eq!(seqs(&first), vec![1, 2]);
        assert_eq!(lane.pending(), 4);

        lane.complete(1);
        assert!(lane.admit().is_empty());
        assert!(first[1].turn.try_recv().is_ok());

        lane.mark_committing(2);
        assert_eq!(lane.state(), LaneState::Dispatching);
        lane.complete(2);
        let mut second = lane.admit();
        assert_eq!(seqs(&second), vec![3, 4]);
        assert!(second[0].turn.try_recv().is_ok());
        assert!(second[1].turn.try_recv().is_err());
        assert_eq!(lane.state(), LaneState::Preparing);

        lane.complete(3);
        lane.admit();
        assert!(second[1].turn.try_recv().is_ok());
        lane.complete(4);
        assert!(lane.is_idle());
        assert_eq!(lane.state(), LaneState::Idle);
    }
}
