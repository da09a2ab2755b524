//! Doubly linked task lists threaded through the task table
//!
//! A task carries one [`Link`] per list kind, so it can sit on the ready list
//! or on one wait list without any allocation. Links hold handles, and the
//! list operations borrow the task table for the duration of one call.

use core::marker::PhantomData;

use crate::fatal::{os_fatal, FatalError};
use crate::task::tcb::{Link, OsTcb};
use crate::types::{OsPrio, TaskId};

/// Selects which link of the TCB a list threads through
pub(crate) trait LinkField {
    fn link(tcb: &OsTcb) -> &Link;
    fn link_mut(tcb: &mut OsTcb) -> &mut Link;
}

pub(crate) struct RdyLink;
pub(crate) struct WaitLink;

impl LinkField for RdyLink {
    #[inline(always)]
    fn link(tcb: &OsTcb) -> &Link {
        &tcb.rdy_link
    }
    #[inline(always)]
    fn link_mut(tcb: &mut OsTcb) -> &mut Link {
        &mut tcb.rdy_link
    }
}

impl LinkField for WaitLink {
    #[inline(always)]
    fn link(tcb: &OsTcb) -> &Link {
        &tcb.wait_link
    }
    #[inline(always)]
    fn link_mut(tcb: &mut OsTcb) -> &mut Link {
        &mut tcb.wait_link
    }
}

#[inline(always)]
fn tcb(tasks: &[OsTcb], id: TaskId) -> &OsTcb {
    tasks.get(id.index()).unwrap_or_else(|| os_fatal(FatalError::BadTask(id)))
}

#[inline(always)]
fn tcb_mut(tasks: &mut [OsTcb], id: TaskId) -> &mut OsTcb {
    tasks.get_mut(id.index()).unwrap_or_else(|| os_fatal(FatalError::BadTask(id)))
}

/// Intrusive list of tasks
pub(crate) struct TaskList<L: LinkField> {
    head: Option<TaskId>,
    tail: Option<TaskId>,
    len: u8,
    _link: PhantomData<L>,
}

impl<L: LinkField> TaskList<L> {
    pub(crate) const fn new() -> Self {
        TaskList {
            head: None,
            tail: None,
            len: 0,
            _link: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn head(&self) -> Option<TaskId> {
        self.head
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len as usize
    }

    /// Link `id` in front of `at`, or at the tail when `at` is `None`
    fn insert_before(&mut self, id: TaskId, at: Option<TaskId>, tasks: &mut [OsTcb]) {
        if L::link(tcb(tasks, id)).linked {
            os_fatal(FatalError::ListCorrupt);
        }

        let prev = match at {
            Some(next) => L::link(tcb(tasks, next)).prev,
            None => self.tail,
        };

        *L::link_mut(tcb_mut(tasks, id)) = Link {
            prev,
            next: at,
            linked: true,
        };

        match prev {
            Some(p) => L::link_mut(tcb_mut(tasks, p)).next = Some(id),
            None => self.head = Some(id),
        }
        match at {
            Some(n) => L::link_mut(tcb_mut(tasks, n)).prev = Some(id),
            None => self.tail = Some(id),
        }

        self.len += 1;
    }

    /// First task for which `pred` holds
    fn find(&self, tasks: &[OsTcb], pred: impl Fn(&OsTcb) -> bool) -> Option<TaskId> {
        let mut cur = self.head;
        while let Some(id) = cur {
            let t = tcb(tasks, id);
            if pred(t) {
                return Some(id);
            }
            cur = L::link(t).next;
        }
        None
    }

    /// Insert in priority order, behind tasks of equal priority
    pub(crate) fn insert_by_prio(&mut self, id: TaskId, tasks: &mut [OsTcb]) {
        let prio: OsPrio = tcb(tasks, id).prio;
        let at = self.find(tasks, |t| t.prio > prio);
        self.insert_before(id, at, tasks);
    }

    /// Insert in priority order, ahead of tasks of equal priority
    pub(crate) fn insert_ahead_of_equals(&mut self, id: TaskId, tasks: &mut [OsTcb]) {
        let prio: OsPrio = tcb(tasks, id).prio;
        let at = self.find(tasks, |t| t.prio >= prio);
        self.insert_before(id, at, tasks);
    }

    /// Remove a TCB from the list
    pub(crate) fn remove(&mut self, id: TaskId, tasks: &mut [OsTcb]) {
        let link = *L::link(tcb(tasks, id));
        if !link.linked {
            os_fatal(FatalError::ListCorrupt);
        }

        match link.prev {
            Some(p) => L::link_mut(tcb_mut(tasks, p)).next = link.next,
            None => self.head = link.next,
        }
        match link.next {
            Some(n) => L::link_mut(tcb_mut(tasks, n)).prev = link.prev,
            None => self.tail = link.prev,
        }

        *L::link_mut(tcb_mut(tasks, id)) = Link::UNLINKED;
        self.len -= 1;
    }

    pub(crate) fn pop_front(&mut self, tasks: &mut [OsTcb]) -> Option<TaskId> {
        let head = self.head?;
        self.remove(head, tasks);
        Some(head)
    }

    /// Walk the list front to back
    pub(crate) fn iter<'a>(&self, tasks: &'a [OsTcb]) -> impl Iterator<Item = TaskId> + 'a {
        let mut cur = self.head;
        core::iter::from_fn(move || {
            let id = cur?;
            cur = L::link(tcb(tasks, id)).next;
            Some(id)
        })
    }
}

impl<L: LinkField> Default for TaskList<L> {
    fn default() -> Self {
        Self::new()
    }
}
