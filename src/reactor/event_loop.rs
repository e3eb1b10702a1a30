//! The event loop proper.
//!
//! Descriptor slots live in a fixed-capacity vector indexed by raw file
//! descriptor. Each slot keeps its interest mask and one handler per
//! direction. Timers live in a [`Dict`] keyed by id.
//!
//! mio reports readiness edge-triggered. A handler that stops early (read
//! chunk consumed, write cap reached) calls [`EventLoop::fire_again`] so the
//! next iteration dispatches it without waiting on the kernel.

use crate::reactor::{Mask, ReactorError};
use crate::storage::{Dict, IntKey};
use mio::unix::SourceFd;
use mio::{Events, Poll, Token};
use std::io;
use std::os::fd::RawFd;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Default number of descriptor slots.
pub const SET_SIZE: usize = 10 * 1024;

/// Identifier handed out by [`EventLoop::create_time_event`].
pub type TimerId = u64;

/// Handler for a ready descriptor.
///
/// Handlers are reference counted so the same one can serve both directions
/// of a descriptor; the loop then calls it once per readiness event.
pub type FileProc<C> = Rc<dyn Fn(&mut EventLoop<C>, &mut C, RawFd, Mask)>;

/// Handler for a due timer.
pub type TimeProc<C> = Box<dyn FnMut(&mut EventLoop<C>, &mut C, TimerId) -> TimerAction>;

/// What a timer wants after it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// Run again after the given delay.
    Again(Duration),
    /// Drop the timer.
    Stop,
}

struct FileEvent<C> {
    mask: Mask,
    rproc: Option<FileProc<C>>,
    wproc: Option<FileProc<C>>,
}

impl<C> FileEvent<C> {
    fn empty() -> Self {
        Self {
            mask: Mask::NONE,
            rproc: None,
            wproc: None,
        }
    }
}

struct TimeEvent<C> {
    when: Instant,
    proc: TimeProc<C>,
}

/// Single-threaded readiness reactor.
///
/// `C` is the context every handler receives alongside the loop itself,
/// typically the server state.
pub struct EventLoop<C> {
    poll: Poll,
    events: Events,
    slots: Vec<FileEvent<C>>,
    max_fd: Option<RawFd>,
    timers: Dict<TimerId, TimeEvent<C>, IntKey>,
    next_timer_id: TimerId,
    pending: Vec<(RawFd, Mask)>,
    stop: bool,
}

impl<C> EventLoop<C> {
    /// Creates a loop able to track descriptors `0..set_size`.
    pub fn new(set_size: usize) -> Result<Self, ReactorError> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(1024),
            slots: (0..set_size).map(|_| FileEvent::empty()).collect(),
            max_fd: None,
            timers: Dict::new(IntKey),
            next_timer_id: 0,
            pending: Vec::new(),
            stop: false,
        })
    }

    pub fn set_size(&self) -> usize {
        self.slots.len()
    }

    /// Highest descriptor with a non-empty mask.
    pub fn max_fd(&self) -> Option<RawFd> {
        self.max_fd
    }

    /// Interest currently registered for `fd`.
    pub fn mask_of(&self, fd: RawFd) -> Mask {
        self.slot_index(fd)
            .map(|i| self.slots[i].mask)
            .unwrap_or(Mask::NONE)
    }

    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    fn slot_index(&self, fd: RawFd) -> Option<usize> {
        usize::try_from(fd).ok().filter(|&i| i < self.slots.len())
    }

    /// Adds `mask` to the interest of `fd` and installs `proc` for each
    /// direction named in `mask`.
    pub fn create_file_event(
        &mut self,
        fd: RawFd,
        mask: Mask,
        proc: FileProc<C>,
    ) -> Result<(), ReactorError> {
        let idx = self.slot_index(fd).ok_or(ReactorError::OutOfRange {
            fd,
            capacity: self.slots.len(),
        })?;

        let old = self.slots[idx].mask;
        let new = old | mask;
        if let Some(interest) = new.to_interest() {
            let registry = self.poll.registry();
            let token = Token(idx);
            if old.is_empty() {
                registry.register(&mut SourceFd(&fd), token, interest)?;
            } else if old != new {
                registry.reregister(&mut SourceFd(&fd), token, interest)?;
            }
        }

        let slot = &mut self.slots[idx];
        slot.mask = new;
        if mask.contains(Mask::READABLE) {
            slot.rproc = Some(Rc::clone(&proc));
        }
        if mask.contains(Mask::WRITABLE) {
            slot.wproc = Some(proc);
        }

        if !new.is_empty() && self.max_fd.map_or(true, |m| fd > m) {
            self.max_fd = Some(fd);
        }
        Ok(())
    }

    /// Removes `mask` from the interest of `fd`. Deregisters the descriptor
    /// once nothing is left. Must be called before the descriptor is closed.
    pub fn delete_file_event(&mut self, fd: RawFd, mask: Mask) -> Result<(), ReactorError> {
        let Some(idx) = self.slot_index(fd) else {
            return Ok(());
        };
        let old = self.slots[idx].mask;
        if old.is_empty() {
            return Ok(());
        }

        let new = old.remove(mask);
        {
            let slot = &mut self.slots[idx];
            slot.mask = new;
            if !new.contains(Mask::READABLE) {
                slot.rproc = None;
            }
            if !new.contains(Mask::WRITABLE) {
                slot.wproc = None;
            }
        }
        self.pending.retain(|&(p, _)| p != fd || !new.is_empty());

        if new.is_empty() && self.max_fd == Some(fd) {
            self.max_fd = (0..fd)
                .rev()
                .find(|&j| !self.slots[j as usize].mask.is_empty());
        }

        let registry = self.poll.registry();
        match new.to_interest() {
            None => registry.deregister(&mut SourceFd(&fd))?,
            Some(interest) if new != old => {
                registry.reregister(&mut SourceFd(&fd), Token(idx), interest)?
            }
            Some(_) => {}
        }
        Ok(())
    }

    /// Schedules `fd` to be dispatched for `mask` on the next iteration even
    /// if the kernel reports nothing new.
    pub fn fire_again(&mut self, fd: RawFd, mask: Mask) {
        if let Some(entry) = self.pending.iter_mut().find(|(p, _)| *p == fd) {
            entry.1 = entry.1 | mask;
        } else {
            self.pending.push((fd, mask));
        }
    }

    /// Registers a timer that first fires after `delay`.
    pub fn create_time_event(&mut self, delay: Duration, proc: TimeProc<C>) -> TimerId {
        let id = self.next_timer_id;
        self.next_timer_id += 1;
        let event = TimeEvent {
            when: Instant::now() + delay,
            proc,
        };
        // Ids are never reused, so the insertion cannot collide.
        let _ = self.timers.add(id, event);
        id
    }

    /// Cancels a timer. A running timer stops itself by returning
    /// [`TimerAction::Stop`] instead.
    pub fn delete_time_event(&mut self, id: TimerId) -> Result<(), ReactorError> {
        if self.timers.delete(&id) {
            Ok(())
        } else {
            Err(ReactorError::NoSuchTimer(id))
        }
    }

    /// Asks [`run`](Self::run) to return after the current iteration.
    pub fn stop(&mut self) {
        self.stop = true;
    }

    fn nearest_timer(&self) -> Option<Instant> {
        self.timers.iter().map(|(_, t)| t.when).min()
    }

    /// Waits for readiness or the nearest timer, then dispatches everything
    /// that fired. Returns the number of file and time events processed.
    pub fn run_once(&mut self, ctx: &mut C) -> Result<usize, ReactorError> {
        if !self.has_events() {
            return Ok(0);
        }

        let timeout = if !self.pending.is_empty() {
            Some(Duration::ZERO)
        } else {
            self.nearest_timer()
                .map(|when| when.saturating_duration_since(Instant::now()))
        };

        let mut fired: Vec<(RawFd, Mask)> = Vec::new();
        if self.max_fd.is_some() || timeout.is_some() {
            match self.poll.poll(&mut self.events, timeout) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
            for event in self.events.iter() {
                let mut mask = Mask::NONE;
                if event.is_readable() || event.is_read_closed() || event.is_error() {
                    mask = mask | Mask::READABLE;
                }
                if event.is_writable() || event.is_write_closed() || event.is_error() {
                    mask = mask | Mask::WRITABLE;
                }
                fired.push((event.token().0 as RawFd, mask));
            }
        }

        for (fd, mask) in std::mem::take(&mut self.pending) {
            match fired.iter_mut().find(|(f, _)| *f == fd) {
                Some(entry) => entry.1 = entry.1 | mask,
                None => fired.push((fd, mask)),
            }
        }

        let mut processed = 0;
        for (fd, mask) in fired {
            if self.dispatch(ctx, fd, mask) {
                processed += 1;
            }
        }
        processed += self.process_time_events(ctx);
        Ok(processed)
    }

    /// Calls the read handler, then the write handler unless it is the very
    /// handler that just ran for readability.
    fn dispatch(&mut self, ctx: &mut C, fd: RawFd, mask: Mask) -> bool {
        let Some(idx) = self.slot_index(fd) else {
            return false;
        };

        let mut rfired: Option<FileProc<C>> = None;
        let slot = &self.slots[idx];
        if slot.mask.contains(Mask::READABLE) && mask.contains(Mask::READABLE) {
            if let Some(rproc) = slot.rproc.clone() {
                rproc(self, ctx, fd, mask);
                rfired = Some(rproc);
            }
        }

        // The read handler may have changed or removed the slot.
        let slot = &self.slots[idx];
        if slot.mask.contains(Mask::WRITABLE) && mask.contains(Mask::WRITABLE) {
            if let Some(wproc) = slot.wproc.clone() {
                let same = rfired.as_ref().is_some_and(|r| Rc::ptr_eq(r, &wproc));
                if !same {
                    wproc(self, ctx, fd, mask);
                }
                return true;
            }
        }
        rfired.is_some()
    }

    fn process_time_events(&mut self, ctx: &mut C) -> usize {
        let now = Instant::now();
        let due: Vec<TimerId> = self
            .timers
            .iter()
            .filter(|(_, t)| t.when <= now)
            .map(|(&id, _)| id)
            .collect();

        let mut processed = 0;
        for id in due {
            // Deleted by an earlier timer in this batch.
            let Some((id, mut event)) = self.timers.detach(&id) else {
                continue;
            };
            trace!(timer = id, "Firing timer");
            match (event.proc)(self, ctx, id) {
                TimerAction::Again(delay) => {
                    event.when = Instant::now() + delay;
                    let _ = self.timers.add(id, event);
                }
                TimerAction::Stop => {}
            }
            processed += 1;
        }
        processed
    }

    /// Whether any descriptor, timer or re-fire could still wake the loop.
    fn has_events(&self) -> bool {
        self.max_fd.is_some() || !self.timers.is_empty() || !self.pending.is_empty()
    }

    /// Runs iterations until [`stop`](Self::stop) is called, or until nothing
    /// is left that could ever fire.
    pub fn run(&mut self, ctx: &mut C) -> Result<(), ReactorError> {
        self.stop = false;
        while !self.stop {
            if !self.has_events() {
                debug!("No file or time events left, leaving the event loop");
                break;
            }
            self.run_once(ctx)?;
        }
        Ok(())
    }
}
