//! Kernel — owns every task, primitive and byte of the arena
//!
//! - `&mut self` on every call, so each call is a critical section
//! - Blocking calls return `Outcome::Blocked`; `wait_result` reports the end
//! - `*_from_isr` calls defer the switch to `interrupt_epilogue`
//!
//! Author: Tern-RTOS contributors

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::config::{KernelConfig, STACK_FILL_BYTE, STACK_GUARD_BYTES};
use crate::error::{FatalError, KernelError};
use crate::heap::{Block, Heap, HeapStats};
use crate::port::Port;
use crate::queue::{Queue, QueueId};
use crate::scheduler::{Reason, Scheduler};
use crate::semaphore::{Semaphore, SemaphoreId};
use crate::task::{Task, TaskEntry, TaskId, TaskPriority, TaskState, WaitOutcome, WaitTarget};
use crate::tick::Tick;

/// Result of a call that may block the calling task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// Completed without blocking
    Done(T),
    /// The caller is parked; `Kernel::wait_result` reports how the wait ended
    Blocked,
}

impl<T> Outcome<T> {
    /// True if the caller was parked
    pub fn is_blocked(&self) -> bool {
        matches!(self, Outcome::Blocked)
    }

    /// The value, if the call completed immediately
    pub fn done(self) -> Option<T> {
        match self {
            Outcome::Done(value) => Some(value),
            Outcome::Blocked => None,
        }
    }
}

/// Kernel-wide counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelStats {
    /// Ticks since boot
    pub ticks: Tick,
    /// Context switches since start
    pub context_switches: u32,
    /// Tasks in the table, idle and unreclaimed ones included
    pub tasks: usize,
    /// Ready tasks, the running one excluded
    pub ready: usize,
    pub blocked: usize,
    pub suspended: usize,
    /// Terminated tasks awaiting reclamation
    pub terminated: usize,
    pub queues: usize,
    pub semaphores: usize,
    pub heap: HeapStats,
}

/// Single-core preemptive kernel over a `Port`
pub struct Kernel<P: Port> {
    pub(crate) config: KernelConfig,
    pub(crate) port: P,
    pub(crate) heap: Heap,
    pub(crate) sched: Scheduler,
    pub(crate) queues: BTreeMap<QueueId, Queue>,
    pub(crate) semaphores: BTreeMap<SemaphoreId, Semaphore>,
    next_object: u32,
    idle: Option<TaskId>,
    started: bool,
    fatal: Option<FatalError>,
}

fn idle_loop() {
    loop {
        core::hint::spin_loop();
    }
}

impl<P: Port> Kernel<P> {
    /// Build a kernel with an arena of `config.heap_size` bytes
    ///
    /// Every stack must fit the guard zone plus the port's initial frame.
    pub fn new(config: KernelConfig, port: P) -> Result<Self, KernelError> {
        config.validate_for_frame(P::FRAME_SIZE)?;
        log::debug!(
            "kernel: {} priorities, {} tasks max, {} byte arena, {} Hz tick",
            config.priorities,
            config.max_tasks,
            config.heap_size,
            config.tick_hz
        );
        Ok(Self {
            config,
            port,
            heap: Heap::new(config.heap_size),
            sched: Scheduler::new(&config),
            queues: BTreeMap::new(),
            semaphores: BTreeMap::new(),
            next_object: 1,
            idle: None,
            started: false,
            fatal: None,
        })
    }

    // ----------------------------------------------------------------
    // Task lifecycle
    // ----------------------------------------------------------------

    /// Create a task that starts at `entry` with its own `stack_size` stack
    ///
    /// The task is ready immediately; if the scheduler is running and the
    /// new task outranks the caller, the caller is preempted.
    pub fn create_task<F>(
        &mut self,
        entry: F,
        name: &str,
        stack_size: usize,
        priority: TaskPriority,
    ) -> Result<TaskId, KernelError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.ensure_alive()?;
        self.check_priority(priority)?;
        if stack_size < self.config.min_stack_size {
            return Err(KernelError::InvalidArgument);
        }
        if self.sched.terminated_count() > 0 {
            self.reclaim_terminated()?;
        }
        // one table slot stays reserved for the idle task until start
        let reserved = usize::from(self.idle.is_none());
        if self.sched.task_count() + reserved >= self.config.max_tasks {
            log::warn!("create_task {:?}: task table full", name);
            return Err(KernelError::ResourceExhausted);
        }

        let id = self.spawn(Box::new(entry), name, stack_size, priority)?;
        self.schedule(Reason::Wake)?;
        Ok(id)
    }

    fn spawn(
        &mut self,
        entry: TaskEntry,
        name: &str,
        stack_size: usize,
        priority: TaskPriority,
    ) -> Result<TaskId, KernelError> {
        let stack = self.heap.allocate(stack_size).map_err(|err| {
            log::warn!("create_task {:?}: no {} byte stack in arena", name, stack_size);
            KernelError::from(err)
        })?;
        let record = match self.heap.allocate(self.config.mailbox_size) {
            Ok(record) => record,
            Err(err) => {
                self.free_block(stack)?;
                return Err(err.into());
            }
        };

        let id = self.sched.alloc_id();
        let memory = self.heap.slice_mut(&stack);
        memory.fill(STACK_FILL_BYTE);
        let context = self.port.init_stack(id, memory, entry);

        self.sched.insert(Task::new(id, name, priority, stack, record, context));
        log::debug!(
            "task {} {:?} created: priority {}, {} byte stack",
            id,
            name,
            priority.0,
            stack_size
        );
        Ok(id)
    }

    /// Terminate a task
    ///
    /// Its mutexes pass to their top waiters and any priority it lent or
    /// borrowed is given back. Stack and control block return to the arena
    /// on the next reclamation pass.
    pub fn delete_task(&mut self, id: TaskId) -> Result<(), KernelError> {
        self.ensure_alive()?;
        if Some(id) == self.idle {
            return Err(KernelError::InvalidHandle);
        }
        if self.sched.get(id)?.state == TaskState::Terminated {
            return Err(KernelError::InvalidHandle);
        }

        self.abandon_wait(id);
        self.sched.detach(id);
        let held = self
            .sched
            .task_mut(id)
            .map(|task| core::mem::take(&mut task.held))
            .unwrap_or_default();
        self.sched.mark_terminated(id);
        for mutex in held {
            self.release_mutex(mutex, id);
        }
        log::debug!("task {} deleted", id);

        let reason = if self.sched.current() == Some(id) {
            Reason::Block
        } else {
            Reason::Wake
        };
        self.schedule(reason)
    }

    /// Free the memory of terminated tasks, except one still on the CPU
    ///
    /// Also runs when the idle task is dispatched and on ticks spent idle.
    pub fn reclaim_terminated(&mut self) -> Result<usize, KernelError> {
        self.ensure_alive()?;
        self.reclaim(None)
    }

    /// Reclaim everything but `outgoing`, a task that deleted itself and is
    /// only now being switched out
    fn reclaim(&mut self, outgoing: Option<TaskId>) -> Result<usize, KernelError> {
        let ids = self.sched.take_reclaimable(outgoing);
        let count = ids.len();
        for id in ids {
            if let Some(task) = self.sched.remove(id) {
                self.port.release(id);
                self.free_block(task.stack)?;
                self.free_block(task.record)?;
                log::trace!("task {} reclaimed", id);
            }
        }
        Ok(count)
    }

    /// Park a task until `resume`; a blocked task abandons its wait
    pub fn suspend(&mut self, id: TaskId) -> Result<(), KernelError> {
        self.ensure_alive()?;
        if Some(id) == self.idle {
            return Err(KernelError::InvalidHandle);
        }
        match self.sched.get(id)?.state {
            TaskState::Terminated => return Err(KernelError::InvalidHandle),
            TaskState::Suspended => return Ok(()),
            TaskState::Blocked => {
                self.abandon_wait(id);
                if let Some(task) = self.sched.task_mut(id) {
                    task.outcome = Some(WaitOutcome::TimedOut);
                    task.mailbox = None;
                }
            }
            TaskState::Ready => self.sched.detach(id),
            TaskState::Running => {}
        }
        self.sched.mark_suspended(id);
        log::debug!("task {} suspended", id);

        if self.sched.current() == Some(id) {
            self.schedule(Reason::Block)
        } else {
            Ok(())
        }
    }

    /// Make a suspended task ready again; no effect on other states
    pub fn resume(&mut self, id: TaskId) -> Result<(), KernelError> {
        self.ensure_alive()?;
        self.sched.get(id)?;
        if !self.sched.unmark_suspended(id) {
            return Ok(());
        }
        self.sched.make_ready(id);
        log::debug!("task {} resumed", id);
        self.schedule(Reason::Wake)
    }

    /// Effective priority, inheritance included
    pub fn priority(&self, id: TaskId) -> Result<TaskPriority, KernelError> {
        self.sched.get(id).map(|task| task.priority)
    }

    /// Priority set at creation or by `set_priority`
    pub fn base_priority(&self, id: TaskId) -> Result<TaskPriority, KernelError> {
        self.sched.get(id).map(|task| task.base_priority)
    }

    /// Change a task's base priority
    ///
    /// An inherited boost above the new base stays in effect until the
    /// mutexes that cause it are released.
    pub fn set_priority(&mut self, id: TaskId, priority: TaskPriority) -> Result<(), KernelError> {
        self.ensure_alive()?;
        self.check_priority(priority)?;
        if Some(id) == self.idle {
            return Err(KernelError::InvalidHandle);
        }
        let task = self.sched.task_mut(id).ok_or(KernelError::InvalidHandle)?;
        if task.state == TaskState::Terminated {
            return Err(KernelError::InvalidHandle);
        }
        task.base_priority = priority;
        self.recompute_priority(id);
        self.schedule(Reason::Wake)
    }

    // ----------------------------------------------------------------
    // Time
    // ----------------------------------------------------------------

    /// Give the CPU to the next ready task of the same priority, if any
    pub fn yield_now(&mut self) -> Result<(), KernelError> {
        self.ensure_alive()?;
        if !self.started {
            return Err(KernelError::NotStarted);
        }
        self.schedule(Reason::Yield)
    }

    /// Block the running task for `ticks` ticks; zero just yields
    pub fn delay(&mut self, ticks: u64) -> Result<Outcome<()>, KernelError> {
        self.ensure_alive()?;
        if ticks == 0 {
            self.yield_now()?;
            return Ok(Outcome::Done(()));
        }
        let deadline = self.sched.now().saturating_add(ticks);
        self.sched.block_current(WaitTarget::Delay, Some(deadline))?;
        self.schedule(Reason::Block)?;
        Ok(Outcome::Blocked)
    }

    /// Block until `*last_wake + period`, then advance `last_wake` by `period`
    ///
    /// Wake times stay on a fixed grid however long the task ran. If the
    /// target already passed the call returns `Done` without blocking.
    pub fn delay_until(&mut self, last_wake: &mut Tick, period: u64) -> Result<Outcome<()>, KernelError> {
        self.ensure_alive()?;
        if period == 0 {
            return Err(KernelError::InvalidArgument);
        }
        let target = last_wake.saturating_add(period);
        if target <= self.sched.now() {
            *last_wake = target;
            return Ok(Outcome::Done(()));
        }
        self.sched.block_current(WaitTarget::Delay, Some(target))?;
        *last_wake = target;
        self.schedule(Reason::Block)?;
        Ok(Outcome::Blocked)
    }

    /// Tick interrupt entry point
    ///
    /// Advances time, wakes every task whose deadline elapsed (a timed out
    /// primitive wait leaves its wait list) and rotates equal priorities
    /// when time slicing is on.
    pub fn tick(&mut self) -> Result<(), KernelError> {
        self.ensure_alive()?;
        self.sched.charge_tick();
        let now = self.sched.advance_clock();

        for id in self.sched.expire(now) {
            let outcome = match self.sched.task(id).and_then(|task| task.blocked_on) {
                Some(WaitTarget::Delay) => WaitOutcome::Satisfied,
                Some(target) => {
                    self.remove_waiter(target, id);
                    WaitOutcome::TimedOut
                }
                None => continue,
            };
            self.sched.wake(id, outcome);
        }
        self.schedule(Reason::Tick)?;
        // the last task to delete itself has long left the CPU by now
        if self.sched.current() == self.idle && self.sched.terminated_count() > 0 {
            self.reclaim(None)?;
        }
        Ok(())
    }

    // ----------------------------------------------------------------
    // Start and interrupts
    // ----------------------------------------------------------------

    /// Create the idle task and dispatch the highest-priority task
    ///
    /// A hardware port never returns from here; `SimPort` does, so the
    /// kernel can be driven by hand.
    pub fn start(&mut self) -> Result<(), KernelError> {
        self.ensure_alive()?;
        if self.started {
            return Err(KernelError::AlreadyStarted);
        }
        let idle = self.spawn(
            Box::new(idle_loop),
            "idle",
            self.config.idle_stack_size,
            TaskPriority::IDLE,
        )?;
        self.idle = Some(idle);
        self.started = true;
        log::info!(
            "scheduler started: {} tasks, {} Hz tick, {} bytes free",
            self.sched.task_count(),
            self.config.tick_hz,
            self.heap.free_bytes()
        );
        self.schedule(Reason::Block)
    }

    /// Perform the reschedule deferred by `*_from_isr` calls
    ///
    /// Returns true if a different task now runs.
    pub fn interrupt_epilogue(&mut self) -> Result<bool, KernelError> {
        self.ensure_alive()?;
        if !self.sched.take_yield_pending() {
            return Ok(false);
        }
        let before = self.sched.current();
        self.schedule(Reason::Wake)?;
        Ok(self.sched.current() != before)
    }

    /// How the last wait of `id` ended
    ///
    /// `Ok` carries the item handed over by a queue receive, if any.
    /// A task that is still blocked reports `WouldBlock`.
    pub fn wait_result(&mut self, id: TaskId) -> Result<Option<Vec<u8>>, KernelError> {
        self.ensure_alive()?;
        let task = self.sched.task_mut(id).ok_or(KernelError::InvalidHandle)?;
        if task.state == TaskState::Blocked {
            return Err(KernelError::WouldBlock);
        }
        match task.outcome.take() {
            Some(WaitOutcome::Satisfied) | None => Ok(task
                .mailbox
                .take()
                .and_then(|len| self.heap.slice(&task.record).get(..len).map(<[u8]>::to_vec))),
            Some(WaitOutcome::TimedOut) => Err(KernelError::TimedOut),
            Some(WaitOutcome::Deleted) => Err(KernelError::Deleted),
        }
    }

    // ----------------------------------------------------------------
    // Queries
    // ----------------------------------------------------------------

    /// Task on the CPU; `None` before `start`
    pub fn current_task(&self) -> Option<TaskId> {
        self.sched.current()
    }

    /// Idle task, created by `start`
    pub fn idle_task(&self) -> Option<TaskId> {
        self.idle
    }

    /// Control block of a task, terminated ones included until reclaimed
    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.sched.task(id)
    }

    /// State of a task
    pub fn task_state(&self, id: TaskId) -> Result<TaskState, KernelError> {
        self.sched.get(id).map(|task| task.state)
    }

    /// Ticks since boot
    pub fn tick_count(&self) -> Tick {
        self.sched.now()
    }

    /// Milliseconds since boot at the configured tick rate
    pub fn uptime_ms(&self) -> u64 {
        self.sched.clock().now_ms()
    }

    /// Convert milliseconds to ticks, rounding up
    pub fn ms_to_ticks(&self, ms: u64) -> u64 {
        self.sched.clock().ms_to_ticks(ms)
    }

    /// True once `start` has dispatched the first task
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Configuration the kernel was built with
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// The architecture port
    pub fn port(&self) -> &P {
        &self.port
    }

    /// The architecture port, mutably
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// The error that halted the kernel, if any
    pub fn fatal_error(&self) -> Option<FatalError> {
        self.fatal
    }

    /// Arena statistics
    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    /// Bytes at the low end of the stack never written since creation
    pub fn stack_high_water_mark(&self, id: TaskId) -> Result<usize, KernelError> {
        let task = self.sched.get(id)?;
        Ok(self
            .heap
            .slice(&task.stack)
            .iter()
            .take_while(|&&b| b == STACK_FILL_BYTE)
            .count())
    }

    /// Raw stack memory of a task, for ports and debug tooling
    pub fn stack_mut(&mut self, id: TaskId) -> Result<&mut [u8], KernelError> {
        let task = self.sched.get(id)?;
        Ok(self.heap.slice_mut(&task.stack))
    }

    /// Snapshot of the kernel-wide counters
    pub fn stats(&self) -> KernelStats {
        let mut stats = KernelStats {
            ticks: self.sched.now(),
            context_switches: self.sched.context_switches(),
            tasks: self.sched.task_count(),
            ready: 0,
            blocked: 0,
            suspended: 0,
            terminated: 0,
            queues: self.queues.len(),
            semaphores: self.semaphores.len(),
            heap: self.heap.stats(),
        };
        for task in self.sched.tasks() {
            match task.state {
                TaskState::Ready => stats.ready += 1,
                TaskState::Blocked => stats.blocked += 1,
                TaskState::Suspended => stats.suspended += 1,
                TaskState::Terminated => stats.terminated += 1,
                TaskState::Running => {}
            }
        }
        stats
    }

    /// Cross-check scheduler sets, wait lists, ownership and the arena
    pub fn verify(&self) -> Result<(), FatalError> {
        self.sched.check_invariants()?;
        if !self.heap.check() {
            return Err(FatalError::InvariantViolation("arena corrupted"));
        }
        for task in self.sched.tasks() {
            if task.state == TaskState::Blocked {
                let listed = match task.blocked_on {
                    Some(WaitTarget::Delay) => true,
                    Some(WaitTarget::QueueSend(q)) => self
                        .queues
                        .get(&q)
                        .map_or(false, |queue| queue.senders.contains(task.id)),
                    Some(WaitTarget::QueueReceive(q)) => self
                        .queues
                        .get(&q)
                        .map_or(false, |queue| queue.receivers.contains(task.id)),
                    Some(WaitTarget::Semaphore(s)) => self
                        .semaphores
                        .get(&s)
                        .map_or(false, |sem| sem.waiters.contains(task.id)),
                    None => false,
                };
                if !listed {
                    return Err(FatalError::InvariantViolation("blocked task not in its wait list"));
                }
            }
            if task.state != TaskState::Terminated && task.priority != self.inherited_priority(task) {
                return Err(FatalError::InvariantViolation("effective priority out of sync"));
            }
        }
        for (&id, sem) in &self.semaphores {
            if !sem.is_mutex() {
                continue;
            }
            let consistent = match sem.owner {
                Some(owner) => {
                    sem.depth > 0
                        && self
                            .sched
                            .task(owner)
                            .map_or(false, |task| task.held.contains(&id))
                }
                None => sem.depth == 0 && sem.waiters.is_empty(),
            };
            if !consistent {
                return Err(FatalError::InvariantViolation("mutex ownership inconsistent"));
            }
        }
        Ok(())
    }

    // ----------------------------------------------------------------
    // Internals shared by the primitives
    // ----------------------------------------------------------------

    pub(crate) fn ensure_alive(&self) -> Result<(), KernelError> {
        match self.fatal {
            Some(fatal) => Err(KernelError::Fatal(fatal)),
            None => Ok(()),
        }
    }

    /// Record a fatal error and stop the port
    pub(crate) fn halt(&mut self, fatal: FatalError) -> KernelError {
        if self.fatal.is_none() {
            log::error!("kernel halted: {}", fatal);
            self.fatal = Some(fatal);
            self.port.halt(&fatal);
        }
        KernelError::Fatal(fatal)
    }

    pub(crate) fn next_object_id(&mut self) -> u32 {
        let id = self.next_object;
        self.next_object += 1;
        id
    }

    pub(crate) fn free_block(&mut self, block: Block) -> Result<(), KernelError> {
        self.heap.free(block).map_err(|err| match KernelError::from(err) {
            KernelError::Fatal(fatal) => self.halt(fatal),
            other => other,
        })
    }

    fn check_priority(&self, priority: TaskPriority) -> Result<(), KernelError> {
        if priority.0 > self.config.max_priority() {
            return Err(KernelError::InvalidPriority);
        }
        Ok(())
    }

    /// Run the scheduler and switch if the selection changed
    pub(crate) fn schedule(&mut self, reason: Reason) -> Result<(), KernelError> {
        if !self.started {
            return Ok(());
        }
        let switch = match self.sched.pick_next(reason) {
            Ok(Some(switch)) => switch,
            Ok(None) => return Ok(()),
            Err(fatal) => return Err(self.halt(fatal)),
        };
        if let Some(from) = switch.from {
            if let Err(fatal) = self.check_stack(from) {
                return Err(self.halt(fatal));
            }
        }
        let restore = match self.sched.task(switch.to) {
            Some(task) => task.context,
            None => return Err(self.halt(FatalError::InvariantViolation("dispatched task missing"))),
        };

        match switch.from {
            Some(from) => {
                let mut save = self.sched.task(from).map(|task| task.context).unwrap_or_default();
                self.port.switch_context(from, &mut save, switch.to, &restore);
                if let Some(task) = self.sched.task_mut(from) {
                    task.context = save;
                }
            }
            None => self.port.start_first_task(switch.to, &restore),
        }
        log::trace!("switch {:?} -> {} ({:?})", switch.from, switch.to, reason);

        if Some(switch.to) == self.idle && self.sched.terminated_count() > 0 {
            self.reclaim(switch.from)?;
        }
        Ok(())
    }

    /// Guard zone intact and saved stack pointer inside the stack
    fn check_stack(&self, id: TaskId) -> Result<(), FatalError> {
        let Some(task) = self.sched.task(id) else {
            return Ok(());
        };
        if task.state == TaskState::Terminated {
            return Ok(());
        }
        let stack = self.heap.slice(&task.stack);
        let guard_intact = stack
            .get(..STACK_GUARD_BYTES)
            .map_or(false, |guard| guard.iter().all(|&b| b == STACK_FILL_BYTE));
        let sp_in_bounds = (STACK_GUARD_BYTES..=stack.len()).contains(&task.context.sp);
        if guard_intact && sp_in_bounds {
            Ok(())
        } else {
            Err(FatalError::StackOverflow(id))
        }
    }

    /// Wake a task from interrupt context; true if it should preempt
    pub(crate) fn wake_from_isr(&mut self, id: TaskId, outcome: WaitOutcome) -> bool {
        let Some(priority) = self.sched.wake(id, outcome) else {
            return false;
        };
        let preempts = match self.sched.running() {
            Some(current) => {
                priority > current.priority
                    || (self.config.preempt_on_equal_priority_wake && priority == current.priority)
            }
            None => false,
        };
        if preempts {
            self.sched.set_yield_pending();
        }
        preempts
    }

    /// Drop a blocked task's wait without readying it
    pub(crate) fn abandon_wait(&mut self, id: TaskId) {
        if let Some(target) = self.sched.unlink_blocked(id) {
            self.remove_waiter(target, id);
        }
    }

    /// Remove `id` from the wait list named by `target`
    pub(crate) fn remove_waiter(&mut self, target: WaitTarget, id: TaskId) {
        match target {
            WaitTarget::Delay => {}
            WaitTarget::QueueSend(q) => {
                if let Some(queue) = self.queues.get_mut(&q) {
                    queue.senders.remove(id);
                }
            }
            WaitTarget::QueueReceive(q) => {
                if let Some(queue) = self.queues.get_mut(&q) {
                    queue.receivers.remove(id);
                }
            }
            WaitTarget::Semaphore(s) => {
                let owner = self.semaphores.get_mut(&s).and_then(|sem| {
                    sem.waiters.remove(id);
                    sem.owner
                });
                // the owner may have been boosted by this waiter
                if let Some(owner) = owner {
                    self.recompute_priority(owner);
                }
            }
        }
    }

    /// Change effective priority, keeping ready and wait lists ordered
    pub(crate) fn set_effective_priority(&mut self, id: TaskId, priority: TaskPriority) {
        let Some(old) = self.sched.set_priority(id, priority) else {
            return;
        };
        if old == priority {
            return;
        }
        log::trace!("task {} priority {} -> {}", id, old.0, priority.0);

        let target = self
            .sched
            .task(id)
            .filter(|task| task.state == TaskState::Blocked)
            .and_then(|task| task.blocked_on);
        match target {
            Some(WaitTarget::QueueSend(q)) => {
                if let Some(queue) = self.queues.get_mut(&q) {
                    queue.senders.reposition(id, priority);
                }
            }
            Some(WaitTarget::QueueReceive(q)) => {
                if let Some(queue) = self.queues.get_mut(&q) {
                    queue.receivers.reposition(id, priority);
                }
            }
            Some(WaitTarget::Semaphore(s)) => {
                if let Some(sem) = self.semaphores.get_mut(&s) {
                    sem.waiters.reposition(id, priority);
                }
            }
            Some(WaitTarget::Delay) | None => {}
        }
    }
}

#[cfg(test)]
#[path = "kernel_tests.rs"]
mod kernel_tests;
