//! Scenario tests driving the kernel through `SimPort`
//!
//! Each test plays the part of whichever task is current: a call made
//! "by task X" is simply a kernel call issued while X is running.
//! Tasks are parked with `suspend` before `start` whenever a test needs
//! them to reach a wait list in a particular order.

use super::*;
use alloc::vec;

use crate::port::{SimPort, SIM_FRAME_SIZE};
use crate::semaphore::SemaphoreKind;
use crate::tick::Timeout;

fn kernel_with(config: KernelConfig) -> Kernel<SimPort> {
    Kernel::new(config, SimPort::new()).unwrap()
}

fn kernel() -> Kernel<SimPort> {
    kernel_with(KernelConfig::new())
}

fn spawn(k: &mut Kernel<SimPort>, name: &str, priority: u8) -> TaskId {
    k.create_task(|| {}, name, 256, TaskPriority(priority)).unwrap()
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_start_dispatches_highest() {
    let mut k = kernel();
    let _lo = spawn(&mut k, "lo", 1);
    let hi = spawn(&mut k, "hi", 3);
    assert_eq!(k.current_task(), None);
    k.start().unwrap();
    assert_eq!(k.current_task(), Some(hi));
    assert_eq!(k.port().trace()[0].from, None);
    assert_eq!(k.task_state(hi), Ok(TaskState::Running));
    assert!(k.idle_task().is_some());
    assert_eq!(k.start(), Err(KernelError::AlreadyStarted));
    assert_eq!(k.verify(), Ok(()));
}

#[test]
fn test_calls_needing_a_task_before_start() {
    let mut k = kernel();
    assert_eq!(k.yield_now(), Err(KernelError::NotStarted));
    assert_eq!(k.delay(5), Err(KernelError::NotStarted));
    // ticks before start only advance time
    k.tick().unwrap();
    assert_eq!(k.tick_count(), 1);
}

#[test]
fn test_invalid_config_rejected() {
    let cfg = KernelConfig::new().with_priorities(0);
    assert!(matches!(
        Kernel::new(cfg, SimPort::new()),
        Err(KernelError::InvalidPriority)
    ));
}

#[test]
fn test_create_task_validation() {
    let mut k = kernel();
    assert_eq!(
        k.create_task(|| {}, "big", 256, TaskPriority(8)).err(),
        Some(KernelError::InvalidPriority)
    );
    assert_eq!(
        k.create_task(|| {}, "tiny", 16, TaskPriority(1)).err(),
        Some(KernelError::InvalidArgument)
    );
}

#[test]
fn test_stack_must_hold_guard_and_frame() {
    let floor = STACK_GUARD_BYTES + SIM_FRAME_SIZE;
    let cfg = KernelConfig::new().with_min_stack_size(48);
    assert!(matches!(
        Kernel::new(cfg, SimPort::new()),
        Err(KernelError::InvalidArgument)
    ));

    let mut k = kernel_with(KernelConfig::new().with_min_stack_size(floor));
    assert_eq!(
        k.create_task(|| {}, "short", floor - 8, TaskPriority(2)).err(),
        Some(KernelError::InvalidArgument)
    );
    let t = k.create_task(|| {}, "snug", floor, TaskPriority(2)).unwrap();
    let _peer = k.create_task(|| {}, "peer", floor, TaskPriority(2)).unwrap();
    k.start().unwrap();
    assert_eq!(k.current_task(), Some(t));

    // switching out of a minimum-size stack leaves its guard intact
    k.yield_now().unwrap();
    k.yield_now().unwrap();
    assert_eq!(k.fatal_error(), None);
    assert_eq!(k.verify(), Ok(()));
}

#[test]
fn test_create_higher_task_preempts() {
    let mut k = kernel();
    let a = spawn(&mut k, "a", 1);
    k.start().unwrap();
    assert_eq!(k.current_task(), Some(a));
    let b = spawn(&mut k, "b", 3);
    assert_eq!(k.current_task(), Some(b));
    let _c = spawn(&mut k, "c", 1);
    assert_eq!(k.current_task(), Some(b));
    assert_eq!(k.verify(), Ok(()));
}

#[test]
fn test_task_table_exhaustion() {
    let mut k = kernel_with(KernelConfig::new().with_max_tasks(4));
    for n in 0..3 {
        spawn(&mut k, "t", n + 1);
    }
    // last slot is kept for the idle task
    assert_eq!(
        k.create_task(|| {}, "extra", 256, TaskPriority(1)).err(),
        Some(KernelError::ResourceExhausted)
    );
    k.start().unwrap();
    assert_eq!(k.stats().tasks, 4);
}

#[test]
fn test_arena_exhaustion() {
    let mut k = kernel_with(KernelConfig::new().with_heap_size(2048));
    let free = k.heap_stats().free_bytes;
    k.create_task(|| {}, "big", 1500, TaskPriority(1)).unwrap();
    assert_eq!(
        k.create_task(|| {}, "big2", 1500, TaskPriority(1)).err(),
        Some(KernelError::ResourceExhausted)
    );
    assert!(k.heap_stats().free_bytes < free);
    assert_eq!(k.verify(), Ok(()));
}

#[test]
fn test_stack_is_filled_and_measured() {
    let mut k = kernel();
    let a = spawn(&mut k, "a", 2);
    let size = k.task(a).unwrap().stack_size();
    assert!(size >= 256);
    assert_eq!(k.stack_high_water_mark(a), Ok(size - SIM_FRAME_SIZE));
    k.stack_mut(a).unwrap()[size - SIM_FRAME_SIZE - 1] = 0;
    assert_eq!(k.stack_high_water_mark(a), Ok(size - SIM_FRAME_SIZE - 1));
}

#[test]
fn test_idle_task_is_protected() {
    let mut k = kernel();
    spawn(&mut k, "a", 1);
    k.start().unwrap();
    let idle = k.idle_task().unwrap();
    assert_eq!(k.delete_task(idle), Err(KernelError::InvalidHandle));
    assert_eq!(k.suspend(idle), Err(KernelError::InvalidHandle));
    assert_eq!(k.set_priority(idle, TaskPriority(3)), Err(KernelError::InvalidHandle));
}

// ============================================================================
// Scheduling
// ============================================================================

#[test]
fn test_round_robin_one_quantum_per_tick() {
    let mut k = kernel();
    let ids = [spawn(&mut k, "t0", 2), spawn(&mut k, "t1", 2), spawn(&mut k, "t2", 2)];
    k.start().unwrap();
    assert_eq!(k.current_task(), Some(ids[0]));
    k.port_mut().clear_trace();

    for _ in 0..9 {
        k.tick().unwrap();
    }
    let order: Vec<TaskId> = k.port().trace().iter().map(|d| d.to).collect();
    assert_eq!(order, [ids[1], ids[2], ids[0], ids[1], ids[2], ids[0], ids[1], ids[2], ids[0]]);
    for id in ids {
        assert_eq!(k.task(id).unwrap().run_ticks(), 3);
    }
    assert_eq!(k.verify(), Ok(()));
}

#[test]
fn test_no_rotation_without_time_slicing() {
    let mut k = kernel_with(KernelConfig::new().with_time_slicing(false));
    let a = spawn(&mut k, "a", 2);
    let b = spawn(&mut k, "b", 2);
    k.start().unwrap();
    for _ in 0..5 {
        k.tick().unwrap();
    }
    assert_eq!(k.current_task(), Some(a));
    k.yield_now().unwrap();
    assert_eq!(k.current_task(), Some(b));
}

#[test]
fn test_delay_lets_higher_task_keep_cpu() {
    let mut k = kernel();
    let a = spawn(&mut k, "a", 1);
    let b = spawn(&mut k, "b", 2);
    k.suspend(b).unwrap();
    k.start().unwrap();
    assert_eq!(k.current_task(), Some(a));

    assert_eq!(k.delay(1000), Ok(Outcome::Blocked));
    k.resume(b).unwrap();
    assert_eq!(k.current_task(), Some(b));

    for _ in 0..999 {
        k.tick().unwrap();
    }
    assert_eq!(k.task_state(a), Ok(TaskState::Blocked));
    k.tick().unwrap();
    // ready at tick 1000, but b still outranks it
    assert_eq!(k.task_state(a), Ok(TaskState::Ready));
    assert_eq!(k.current_task(), Some(b));

    k.delay(10).unwrap();
    assert_eq!(k.current_task(), Some(a));
    assert_eq!(k.wait_result(a), Ok(None));
    assert_eq!(k.verify(), Ok(()));
}

#[test]
fn test_delay_zero_yields() {
    let mut k = kernel();
    let a = spawn(&mut k, "a", 2);
    let b = spawn(&mut k, "b", 2);
    k.start().unwrap();
    assert_eq!(k.delay(0), Ok(Outcome::Done(())));
    assert_eq!(k.current_task(), Some(b));
    assert_eq!(k.task_state(a), Ok(TaskState::Ready));
}

#[test]
fn test_delay_until_keeps_period() {
    let mut k = kernel();
    let a = spawn(&mut k, "a", 2);
    k.start().unwrap();

    let mut last = 0;
    assert_eq!(k.delay_until(&mut last, 10), Ok(Outcome::Blocked));
    assert_eq!(last, 10);
    for _ in 0..10 {
        k.tick().unwrap();
    }
    assert_eq!(k.current_task(), Some(a));

    // three ticks of work do not shift the next wake
    for _ in 0..3 {
        k.tick().unwrap();
    }
    assert_eq!(k.delay_until(&mut last, 10), Ok(Outcome::Blocked));
    for _ in 0..6 {
        k.tick().unwrap();
    }
    assert_ne!(k.current_task(), Some(a));
    k.tick().unwrap();
    assert_eq!(k.current_task(), Some(a));
    assert_eq!(k.tick_count(), 20);

    // a missed period returns at once
    let mut stale = 0;
    assert_eq!(k.delay_until(&mut stale, 10), Ok(Outcome::Done(())));
    assert_eq!(stale, 10);
    assert_eq!(k.delay_until(&mut stale, 0), Err(KernelError::InvalidArgument));
}

#[test]
fn test_set_priority_reorders() {
    let mut k = kernel();
    let a = spawn(&mut k, "a", 2);
    let b = spawn(&mut k, "b", 1);
    k.start().unwrap();
    k.set_priority(b, TaskPriority(3)).unwrap();
    assert_eq!(k.current_task(), Some(b));
    assert_eq!(k.set_priority(b, TaskPriority(8)), Err(KernelError::InvalidPriority));
    k.set_priority(a, TaskPriority(4)).unwrap();
    assert_eq!(k.current_task(), Some(a));
    assert_eq!(k.base_priority(a), Ok(TaskPriority(4)));
    // lowering the running task hands the cpu over
    k.set_priority(a, TaskPriority(1)).unwrap();
    assert_eq!(k.current_task(), Some(b));
    assert_eq!(k.verify(), Ok(()));
}

#[test]
fn test_suspend_and_resume() {
    let mut k = kernel();
    let a = spawn(&mut k, "a", 3);
    let b = spawn(&mut k, "b", 1);
    k.start().unwrap();
    k.suspend(a).unwrap();
    assert_eq!(k.current_task(), Some(b));
    assert_eq!(k.task_state(a), Ok(TaskState::Suspended));
    // suspending twice is harmless; resuming a ready task too
    k.suspend(a).unwrap();
    k.resume(b).unwrap();
    assert_eq!(k.stats().suspended, 1);
    k.resume(a).unwrap();
    assert_eq!(k.current_task(), Some(a));
    assert_eq!(k.verify(), Ok(()));
}

#[test]
fn test_suspending_blocked_task_abandons_wait() {
    let mut k = kernel();
    let a = spawn(&mut k, "a", 2);
    let q = k.queue_create(2, 1).unwrap();
    k.start().unwrap();
    assert!(k.queue_receive(q, Timeout::Infinite).unwrap().is_blocked());
    assert_eq!(k.queue(q).unwrap().waiting(), (0, 1));

    k.suspend(a).unwrap();
    assert_eq!(k.queue(q).unwrap().waiting(), (0, 0));
    // a send now has nobody to hand to
    k.queue_send(q, &[5], Timeout::NonBlocking).unwrap();
    assert_eq!(k.queue_len(q), Ok(1));

    k.resume(a).unwrap();
    assert_eq!(k.current_task(), Some(a));
    assert_eq!(k.wait_result(a), Err(KernelError::TimedOut));
    assert_eq!(k.verify(), Ok(()));
}

#[test]
fn test_equal_priority_wake_preemption_is_configurable() {
    for preempt in [false, true] {
        let mut k = kernel_with(KernelConfig::new().with_equal_priority_preemption(preempt));
        let a = spawn(&mut k, "a", 2);
        let b = spawn(&mut k, "b", 2);
        let s = k.semaphore_create(SemaphoreKind::Binary).unwrap();
        k.start().unwrap();
        assert!(k.take(s, Timeout::Infinite).unwrap().is_blocked());
        assert_eq!(k.current_task(), Some(b));
        k.give(s).unwrap();
        let expected = if preempt { a } else { b };
        assert_eq!(k.current_task(), Some(expected));
    }
}

// ============================================================================
// Wait lists and timeouts
// ============================================================================

#[test]
fn test_binary_semaphore_wakes_highest_then_fifo() {
    let mut k = kernel();
    let s = k.semaphore_create(SemaphoreKind::Binary).unwrap();
    let a = spawn(&mut k, "a", 1);
    let b = spawn(&mut k, "b", 2);
    let c = spawn(&mut k, "c", 2);
    k.suspend(b).unwrap();
    k.suspend(c).unwrap();
    k.start().unwrap();

    // arrival order: a (1), b (2), c (2)
    assert!(k.take(s, Timeout::Infinite).unwrap().is_blocked());
    k.resume(b).unwrap();
    assert!(k.take(s, Timeout::Infinite).unwrap().is_blocked());
    k.resume(c).unwrap();
    assert!(k.take(s, Timeout::Infinite).unwrap().is_blocked());
    assert_eq!(k.current_task(), k.idle_task());
    assert_eq!(k.semaphore(s).unwrap().waiting(), 3);

    k.give(s).unwrap();
    assert_eq!(k.current_task(), Some(b));
    assert_eq!(k.task_state(c), Ok(TaskState::Blocked));
    assert_eq!(k.task_state(a), Ok(TaskState::Blocked));

    k.give(s).unwrap();
    assert_eq!(k.task_state(c), Ok(TaskState::Ready));
    assert_eq!(k.task_state(a), Ok(TaskState::Blocked));
    k.give(s).unwrap();
    assert_eq!(k.task_state(a), Ok(TaskState::Ready));

    // nobody left waiting: the count goes up instead
    assert_eq!(k.semaphore_count(s), Ok(0));
    k.give(s).unwrap();
    assert_eq!(k.semaphore_count(s), Ok(1));
    assert_eq!(k.verify(), Ok(()));
}

#[test]
fn test_semaphore_take_times_out() {
    let mut k = kernel();
    let s = k.semaphore_create(SemaphoreKind::Binary).unwrap();
    let a = spawn(&mut k, "a", 2);
    k.start().unwrap();
    assert!(k.take(s, Timeout::Ticks(3)).unwrap().is_blocked());
    assert_eq!(k.wait_result(a), Err(KernelError::WouldBlock));
    k.tick().unwrap();
    k.tick().unwrap();
    assert_eq!(k.task_state(a), Ok(TaskState::Blocked));
    k.tick().unwrap();
    assert_eq!(k.current_task(), Some(a));
    assert_eq!(k.wait_result(a), Err(KernelError::TimedOut));
    assert_eq!(k.semaphore(s).unwrap().waiting(), 0);
    assert_eq!(k.verify(), Ok(()));
}

#[test]
fn test_queue_receive_times_out() {
    let mut k = kernel();
    let q = k.queue_create(1, 4).unwrap();
    let r = spawn(&mut k, "r", 2);
    k.start().unwrap();
    assert!(k.queue_receive(q, Timeout::Ticks(3)).unwrap().is_blocked());
    for _ in 0..3 {
        k.tick().unwrap();
    }
    assert_eq!(k.current_task(), Some(r));
    assert_eq!(k.wait_result(r), Err(KernelError::TimedOut));
    assert_eq!(k.queue(q).unwrap().waiting(), (0, 0));
}

#[test]
fn test_blocked_sender_refilled_on_receive() {
    let mut k = kernel();
    let q = k.queue_create(1, 1).unwrap();
    let s = spawn(&mut k, "s", 2);
    let r = spawn(&mut k, "r", 1);
    k.suspend(r).unwrap();
    k.start().unwrap();

    assert_eq!(k.queue_send(q, &[1], Timeout::Infinite), Ok(Outcome::Done(())));
    assert_eq!(k.queue_send(q, &[2], Timeout::Infinite), Ok(Outcome::Blocked));
    assert_eq!(k.queue(q).unwrap().waiting(), (1, 0));

    k.resume(r).unwrap();
    assert_eq!(k.current_task(), Some(r));
    assert_eq!(k.queue_receive(q, Timeout::NonBlocking), Ok(Outcome::Done(vec![1])));
    // the sender's item moved into the freed slot and the sender preempted
    assert_eq!(k.current_task(), Some(s));
    assert_eq!(k.wait_result(s), Ok(None));
    assert_eq!(k.queue_len(q), Ok(1));

    k.delay(5).unwrap();
    assert_eq!(k.queue_receive(q, Timeout::NonBlocking), Ok(Outcome::Done(vec![2])));
    assert_eq!(k.verify(), Ok(()));
}

#[test]
fn test_blocked_sender_parks_item_in_its_mailbox() {
    let mut k = kernel();
    let q = k.queue_create(1, 4).unwrap();
    let s = spawn(&mut k, "s", 2);
    k.start().unwrap();
    let free = k.heap_stats().free_bytes;

    k.queue_send(q, &[1, 1, 1, 1], Timeout::NonBlocking).unwrap();
    assert!(k.queue_send(q, &[7, 8, 9, 10], Timeout::Infinite).unwrap().is_blocked());
    let task = k.task(s).unwrap();
    assert_eq!(task.mailbox, Some(4));
    assert_eq!(&k.heap.slice(&task.record)[..4], &[7, 8, 9, 10]);
    // blocking carves nothing new from the arena
    assert_eq!(k.heap_stats().free_bytes, free);

    assert_eq!(k.queue_receive_from_isr(q), Ok((vec![1, 1, 1, 1], true)));
    assert_eq!(k.task(s).unwrap().mailbox, None);
    assert_eq!(k.queue_peek(q), Ok(vec![7, 8, 9, 10]));
    assert_eq!(k.interrupt_epilogue(), Ok(true));
    assert_eq!(k.wait_result(s), Ok(None));
    assert_eq!(k.verify(), Ok(()));
}

#[test]
fn test_item_handed_to_receiver_lands_in_its_mailbox() {
    let mut k = kernel();
    let q = k.queue_create(2, 3).unwrap();
    let r = spawn(&mut k, "r", 3);
    let _s = spawn(&mut k, "s", 1);
    k.start().unwrap();
    assert!(k.queue_receive(q, Timeout::Infinite).unwrap().is_blocked());

    k.queue_send(q, &[4, 5, 6], Timeout::NonBlocking).unwrap();
    assert_eq!(k.current_task(), Some(r));
    let task = k.task(r).unwrap();
    assert_eq!(&k.heap.slice(&task.record)[..3], &[4, 5, 6]);
    assert_eq!(k.wait_result(r), Ok(Some(vec![4, 5, 6])));
    assert_eq!(k.wait_result(r), Ok(None));
}

#[test]
fn test_blocked_sender_times_out_without_delivering() {
    let mut k = kernel();
    let q = k.queue_create(1, 1).unwrap();
    let s = spawn(&mut k, "s", 2);
    k.start().unwrap();
    k.queue_send(q, &[1], Timeout::NonBlocking).unwrap();
    assert!(k.queue_send(q, &[2], Timeout::Ticks(2)).unwrap().is_blocked());
    k.tick().unwrap();
    k.tick().unwrap();
    assert_eq!(k.wait_result(s), Err(KernelError::TimedOut));
    assert_eq!(k.queue_receive(q, Timeout::NonBlocking), Ok(Outcome::Done(vec![1])));
    assert_eq!(k.queue_receive(q, Timeout::NonBlocking), Err(KernelError::WouldBlock));
}

#[test]
fn test_queue_reset_admits_blocked_senders() {
    let mut k = kernel();
    let q = k.queue_create(1, 1).unwrap();
    let s = spawn(&mut k, "s", 2);
    k.start().unwrap();
    k.queue_send(q, &[1], Timeout::NonBlocking).unwrap();
    assert!(k.queue_send(q, &[2], Timeout::Infinite).unwrap().is_blocked());

    k.queue_reset(q).unwrap();
    assert_eq!(k.current_task(), Some(s));
    assert_eq!(k.wait_result(s), Ok(None));
    assert_eq!(k.queue_peek(q), Ok(vec![2]));
    assert_eq!(k.verify(), Ok(()));
}

#[test]
fn test_queue_delete_wakes_waiters() {
    let mut k = kernel();
    let q = k.queue_create(1, 1).unwrap();
    let r = spawn(&mut k, "r", 2);
    k.start().unwrap();
    assert!(k.queue_receive(q, Timeout::Infinite).unwrap().is_blocked());
    k.queue_delete(q).unwrap();
    assert_eq!(k.current_task(), Some(r));
    assert_eq!(k.wait_result(r), Err(KernelError::Deleted));
    assert_eq!(k.queue_send(q, &[1], Timeout::NonBlocking), Err(KernelError::InvalidHandle));
    assert_eq!(k.verify(), Ok(()));
}

// ============================================================================
// Interrupt context
// ============================================================================

#[test]
fn test_isr_sends_overflow_past_capacity() {
    let mut k = kernel();
    let q = k.queue_create(5, 4).unwrap();
    for v in 0u32..10 {
        let result = k.queue_send_from_isr(q, &v.to_le_bytes());
        if v < 5 {
            assert_eq!(result, Ok(false));
        } else {
            assert_eq!(result, Err(KernelError::Overflow));
        }
    }
    assert_eq!(k.queue_len(q), Ok(5));
    for v in 0u32..5 {
        assert_eq!(k.queue_receive_from_isr(q), Ok((v.to_le_bytes().to_vec(), false)));
    }
    assert_eq!(k.verify(), Ok(()));
}

#[test]
fn test_isr_send_to_waiting_receiver_defers_switch() {
    let mut k = kernel();
    let q = k.queue_create(2, 2).unwrap();
    let r = spawn(&mut k, "r", 3);
    let w = spawn(&mut k, "w", 1);
    k.start().unwrap();
    assert!(k.queue_receive(q, Timeout::Infinite).unwrap().is_blocked());
    assert_eq!(k.current_task(), Some(w));

    assert_eq!(k.queue_send_from_isr(q, &[7, 8]), Ok(true));
    assert_eq!(k.current_task(), Some(w));
    assert_eq!(k.interrupt_epilogue(), Ok(true));
    assert_eq!(k.current_task(), Some(r));
    assert_eq!(k.wait_result(r), Ok(Some(vec![7, 8])));
}

#[test]
fn test_isr_wake_of_lower_task_needs_no_yield() {
    let mut k = kernel();
    let s = k.semaphore_create(SemaphoreKind::Binary).unwrap();
    let lo = spawn(&mut k, "lo", 1);
    let hi = spawn(&mut k, "hi", 3);
    k.suspend(hi).unwrap();
    k.start().unwrap();
    assert!(k.take(s, Timeout::Infinite).unwrap().is_blocked());
    k.resume(hi).unwrap();
    assert_eq!(k.give_from_isr(s), Ok(false));
    assert_eq!(k.interrupt_epilogue(), Ok(false));
    assert_eq!(k.current_task(), Some(hi));
    assert_eq!(k.task_state(lo), Ok(TaskState::Ready));
}

// ============================================================================
// Priority inheritance
// ============================================================================

#[test]
fn test_inheritance_round_trip_nested() {
    let mut k = kernel();
    let m1 = k.semaphore_create(SemaphoreKind::Mutex).unwrap();
    let m2 = k.semaphore_create(SemaphoreKind::Mutex).unwrap();
    let l = spawn(&mut k, "low", 1);
    let m = spawn(&mut k, "mid", 2);
    let h = spawn(&mut k, "high", 3);
    let h2 = spawn(&mut k, "top", 4);
    for id in [m, h, h2] {
        k.suspend(id).unwrap();
    }
    k.start().unwrap();

    k.lock(m1, Timeout::Infinite).unwrap();
    k.lock(m2, Timeout::Infinite).unwrap();

    k.resume(h).unwrap();
    assert_eq!(k.lock(m1, Timeout::Infinite), Ok(Outcome::Blocked));
    assert_eq!(k.current_task(), Some(l));
    assert_eq!(k.priority(l), Ok(TaskPriority(3)));
    assert!(k.task(l).unwrap().is_boosted());

    // a medium task cannot cut in while low is boosted
    k.resume(m).unwrap();
    assert_eq!(k.current_task(), Some(l));

    k.resume(h2).unwrap();
    assert_eq!(k.lock(m2, Timeout::Infinite), Ok(Outcome::Blocked));
    assert_eq!(k.priority(l), Ok(TaskPriority(4)));
    assert_eq!(k.current_task(), Some(l));
    assert_eq!(k.verify(), Ok(()));

    k.unlock(m2).unwrap();
    assert_eq!(k.priority(l), Ok(TaskPriority(3)));
    assert_eq!(k.current_task(), Some(h2));
    assert_eq!(k.mutex_owner(m2), Ok(Some(h2)));
    assert_eq!(k.wait_result(h2), Ok(None));

    k.unlock(m2).unwrap();
    k.delay(100).unwrap();
    assert_eq!(k.current_task(), Some(l));

    k.unlock(m1).unwrap();
    assert_eq!(k.priority(l), Ok(TaskPriority(1)));
    assert!(!k.task(l).unwrap().is_boosted());
    assert_eq!(k.current_task(), Some(h));
    assert_eq!(k.mutex_owner(m1), Ok(Some(h)));
    assert_eq!(k.verify(), Ok(()));
}

/// low holds m1; mid holds m2 and waits on m1; high waits on m2
fn chain(timeout: Timeout) -> (Kernel<SimPort>, [TaskId; 3], [SemaphoreId; 2]) {
    let mut k = kernel();
    let m1 = k.semaphore_create(SemaphoreKind::Mutex).unwrap();
    let m2 = k.semaphore_create(SemaphoreKind::Mutex).unwrap();
    let l = spawn(&mut k, "low", 1);
    let m = spawn(&mut k, "mid", 2);
    let h = spawn(&mut k, "high", 3);
    k.suspend(m).unwrap();
    k.suspend(h).unwrap();
    k.start().unwrap();

    k.lock(m1, Timeout::Infinite).unwrap();
    k.resume(m).unwrap();
    k.lock(m2, Timeout::Infinite).unwrap();
    assert!(k.lock(m1, Timeout::Infinite).unwrap().is_blocked());
    assert_eq!(k.priority(l), Ok(TaskPriority(2)));

    k.resume(h).unwrap();
    assert!(k.lock(m2, timeout).unwrap().is_blocked());
    assert_eq!(k.current_task(), Some(l));
    (k, [l, m, h], [m1, m2])
}

#[test]
fn test_inheritance_is_transitive() {
    let (k, [l, m, _], _) = chain(Timeout::Infinite);
    assert_eq!(k.priority(m), Ok(TaskPriority(3)));
    assert_eq!(k.priority(l), Ok(TaskPriority(3)));
    assert_eq!(k.verify(), Ok(()));
}

#[test]
fn test_timed_out_waiter_unwinds_chain() {
    let (mut k, [l, m, h], _) = chain(Timeout::Ticks(5));
    for _ in 0..5 {
        k.tick().unwrap();
    }
    assert_eq!(k.current_task(), Some(h));
    assert_eq!(k.wait_result(h), Err(KernelError::TimedOut));
    assert_eq!(k.priority(m), Ok(TaskPriority(2)));
    assert_eq!(k.priority(l), Ok(TaskPriority(2)));
    assert_eq!(k.verify(), Ok(()));
}

#[test]
fn test_deleting_blocked_middle_task_restores_chain() {
    let (mut k, [l, m, h], [m1, m2]) = chain(Timeout::Infinite);
    k.delete_task(m).unwrap();
    assert_eq!(k.task_state(m), Ok(TaskState::Terminated));
    assert_eq!(k.priority(l), Ok(TaskPriority(1)));
    // mid's mutex went to its waiter
    assert_eq!(k.mutex_owner(m2), Ok(Some(h)));
    assert_eq!(k.mutex_owner(m1), Ok(Some(l)));
    assert_eq!(k.current_task(), Some(h));
    assert_eq!(k.wait_result(h), Ok(None));
    assert_eq!(k.verify(), Ok(()));
}

#[test]
fn test_deleting_mutex_owner_hands_over() {
    let mut k = kernel();
    let mx = k.semaphore_create(SemaphoreKind::Mutex).unwrap();
    let l = spawn(&mut k, "low", 1);
    let h = spawn(&mut k, "high", 3);
    k.suspend(h).unwrap();
    k.start().unwrap();
    k.lock(mx, Timeout::Infinite).unwrap();
    k.resume(h).unwrap();
    assert!(k.lock(mx, Timeout::Infinite).unwrap().is_blocked());
    assert_eq!(k.priority(l), Ok(TaskPriority(3)));

    // low deletes itself while boosted
    k.delete_task(l).unwrap();
    assert_eq!(k.current_task(), Some(h));
    assert_eq!(k.mutex_owner(mx), Ok(Some(h)));
    assert_eq!(k.task(l).unwrap().priority(), TaskPriority(1));
    assert_eq!(k.delete_task(l), Err(KernelError::InvalidHandle));

    k.delay(1).unwrap();
    assert!(k.task(l).is_none());
    assert_eq!(k.verify(), Ok(()));
}

#[test]
fn test_semaphore_delete_restores_owner() {
    let mut k = kernel();
    let mx = k.semaphore_create(SemaphoreKind::Mutex).unwrap();
    let l = spawn(&mut k, "low", 1);
    let h = spawn(&mut k, "high", 3);
    k.suspend(h).unwrap();
    k.start().unwrap();
    k.lock(mx, Timeout::Infinite).unwrap();
    k.resume(h).unwrap();
    assert!(k.lock(mx, Timeout::Infinite).unwrap().is_blocked());

    k.semaphore_delete(mx).unwrap();
    assert_eq!(k.current_task(), Some(h));
    assert_eq!(k.wait_result(h), Err(KernelError::Deleted));
    assert_eq!(k.priority(l), Ok(TaskPriority(1)));
    assert!(k.task(l).unwrap().held.is_empty());
    assert_eq!(k.verify(), Ok(()));
}

// ============================================================================
// Reclamation and fatal errors
// ============================================================================

#[test]
fn test_deleted_task_memory_returns_at_idle() {
    let mut k = kernel();
    let a = spawn(&mut k, "a", 1);
    k.start().unwrap();
    let before = k.heap_stats().free_bytes;

    let t = spawn(&mut k, "t", 2);
    assert_eq!(k.current_task(), Some(t));
    assert!(k.heap_stats().free_bytes < before);

    k.delete_task(t).unwrap();
    assert_eq!(k.current_task(), Some(a));
    assert_eq!(k.stats().terminated, 1);
    assert!(k.heap_stats().free_bytes < before);

    k.delay(5).unwrap();
    assert_eq!(k.current_task(), k.idle_task());
    assert!(k.task(t).is_none());
    assert!(!k.port().has_entry(t));
    assert_eq!(k.heap_stats().free_bytes, before);
    assert_eq!(k.stats().terminated, 0);
    assert_eq!(k.task_state(t), Err(KernelError::InvalidHandle));
}

#[test]
fn test_self_delete_keeps_memory_until_off_cpu() {
    let mut k = kernel();
    let t = spawn(&mut k, "t", 2);
    k.start().unwrap();
    let live = k.heap_stats().live_allocations;

    // t deletes itself and only idle is left to run
    k.delete_task(t).unwrap();
    assert_eq!(k.current_task(), k.idle_task());
    assert_eq!(k.task_state(t), Ok(TaskState::Terminated));
    assert_eq!(k.heap_stats().live_allocations, live);
    assert!(k.port().has_entry(t));

    // by the next tick the switch away from t has completed
    k.tick().unwrap();
    assert!(k.task(t).is_none());
    assert!(!k.port().has_entry(t));
    assert_eq!(k.heap_stats().live_allocations, live - 2);
    assert_eq!(k.verify(), Ok(()));
}

#[test]
fn test_explicit_reclaim() {
    let mut k = kernel();
    let _a = spawn(&mut k, "a", 2);
    let b = spawn(&mut k, "b", 1);
    k.start().unwrap();
    let live = k.heap_stats().live_allocations;
    k.delete_task(b).unwrap();
    assert_eq!(k.reclaim_terminated(), Ok(1));
    assert_eq!(k.heap_stats().live_allocations, live - 2);
    assert_eq!(k.reclaim_terminated(), Ok(0));
}

#[test]
fn test_stack_guard_corruption_halts() {
    let mut k = kernel();
    let a = spawn(&mut k, "a", 2);
    let _b = spawn(&mut k, "b", 2);
    k.start().unwrap();
    k.stack_mut(a).unwrap()[0] = 0;

    let fatal = FatalError::StackOverflow(a);
    assert_eq!(k.yield_now(), Err(KernelError::Fatal(fatal)));
    assert_eq!(k.port().halted(), Some(fatal));
    assert_eq!(k.fatal_error(), Some(fatal));

    // everything after the halt reports it
    assert_eq!(k.tick(), Err(KernelError::Fatal(fatal)));
    assert_eq!(k.queue_create(1, 1), Err(KernelError::Fatal(fatal)));
}

#[test]
fn test_stats_snapshot() {
    let mut k = kernel();
    let _a = spawn(&mut k, "a", 2);
    let b = spawn(&mut k, "b", 1);
    k.queue_create(4, 4).unwrap();
    k.semaphore_create(SemaphoreKind::Binary).unwrap();
    k.start().unwrap();
    k.suspend(b).unwrap();
    k.tick().unwrap();

    let stats = k.stats();
    assert_eq!(stats.ticks, 1);
    assert_eq!(stats.tasks, 3);
    assert_eq!(stats.ready, 1);
    assert_eq!(stats.suspended, 1);
    assert_eq!(stats.queues, 1);
    assert_eq!(stats.semaphores, 1);
    assert!(stats.context_switches >= 1);
    // stack and mailbox per task, plus the queue's slots
    assert_eq!(stats.heap.live_allocations, 3 * 2 + 1);
    assert_eq!(k.uptime_ms(), 1);
    assert_eq!(k.ms_to_ticks(5), 5);
}
