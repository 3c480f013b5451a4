//! Kernel service bodies
//!
//! Each body reads its arguments from the caller's saved registers,
//! performs the operation, writes the result into the saved `edx`,
//! and re-readies the caller unless it blocked. The caller was marked
//! WAITING on entry to [`super::execute`].

use super::printf::RenderBuf;
use super::ServiceContext;
use crate::drivers::display::puts_bytes;
use crate::process::ProcessState;
use crate::time;

/// Wait for a key and return its code.
pub fn sys_getc(ctx: &mut ServiceContext<'_>) {
    let key = ctx.keys.getc();
    let caller = ctx.table.get_mut(ctx.current).expect("caller alive");
    caller.cpu.edx = u32::from(key);
    caller.state = ProcessState::Ready;
}

/// Formatted output. `ebx` points at the format string, `ecx` at the
/// first argument slot on the caller's stack. Returns 1 on success,
/// 0 when any pointer failed validation (and prints nothing).
pub fn sys_printf(ctx: &mut ServiceContext<'_>) {
    let (space, format_ptr, args_ptr) = {
        let caller = ctx.table.get(ctx.current).expect("caller alive");
        (caller.mem.space, caller.cpu.ebx, caller.cpu.ecx)
    };

    let mut out = RenderBuf::new();
    let ok = super::printf::render(&space, ctx.phys, format_ptr, args_ptr, &mut out).is_ok();
    if ok {
        puts_bytes(ctx.display, out.bytes());
    }

    let caller = ctx.table.get_mut(ctx.current).expect("caller alive");
    caller.cpu.edx = u32::from(ok);
    caller.state = ProcessState::Ready;
}

/// Put the caller to sleep for `ebx` milliseconds. The scheduler
/// re-readies it once the deadline epoch has passed; a sub-epoch
/// request still parks the caller until the next tick.
pub fn sys_sleep(ctx: &mut ServiceContext<'_>) {
    let now = ctx.now_epochs;
    let caller = ctx.table.get_mut(ctx.current).expect("caller alive");
    let ms = caller.cpu.ebx;
    caller.sleep_end = time::sleep_deadline(now, ms).max(1);
    caller.state = ProcessState::Waiting;
}

pub fn sys_mutex_create(ctx: &mut ServiceContext<'_>) {
    let pid = ctx.table.get(ctx.current).expect("caller alive").pid;
    let key = ctx.mutexes.create(pid).unwrap_or(0);
    let caller = ctx.table.get_mut(ctx.current).expect("caller alive");
    caller.cpu.edx = u32::from(key);
    caller.state = ProcessState::Ready;
}

pub fn sys_mutex_destroy(ctx: &mut ServiceContext<'_>) {
    let caller = ctx.table.get(ctx.current).expect("caller alive");
    let (key, pid) = (caller.cpu.ebx as u8, caller.pid);
    let _ = ctx.mutexes.destroy(key, pid);
    ctx.table.get_mut(ctx.current).expect("caller alive").state = ProcessState::Ready;
}

/// Lock: the caller either acquires and continues, or stays WAITING
/// in the mutex's queue until the holder's unlock hands over.
pub fn sys_mutex_lock(ctx: &mut ServiceContext<'_>) {
    let key = ctx.table.get(ctx.current).expect("caller alive").cpu.ebx as u8;
    match ctx.mutexes.lock(key, ctx.current, ctx.table) {
        Ok(true) => {
            ctx.table.get_mut(ctx.current).expect("caller alive").state = ProcessState::Ready;
        }
        Ok(false) => {} // queued; stays WAITING
        Err(_) => {
            let caller = ctx.table.get_mut(ctx.current).expect("caller alive");
            caller.cpu.edx = 0;
            caller.state = ProcessState::Ready;
        }
    }
}

pub fn sys_mutex_unlock(ctx: &mut ServiceContext<'_>) {
    let key = ctx.table.get(ctx.current).expect("caller alive").cpu.ebx as u8;
    let ok = ctx.mutexes.unlock(key, ctx.current, ctx.table).is_ok();
    let caller = ctx.table.get_mut(ctx.current).expect("caller alive");
    caller.cpu.edx = u32::from(ok);
    caller.state = ProcessState::Ready;
}

pub fn sys_semaphore_create(ctx: &mut ServiceContext<'_>) {
    let caller = ctx.table.get(ctx.current).expect("caller alive");
    let (init, pid) = (caller.cpu.ebx as u8, caller.pid);
    let key = ctx.semaphores.create(init, pid).unwrap_or(0);
    let caller = ctx.table.get_mut(ctx.current).expect("caller alive");
    caller.cpu.edx = u32::from(key);
    caller.state = ProcessState::Ready;
}

pub fn sys_semaphore_destroy(ctx: &mut ServiceContext<'_>) {
    let caller = ctx.table.get(ctx.current).expect("caller alive");
    let (key, pid) = (caller.cpu.ebx as u8, caller.pid);
    let _ = ctx.semaphores.destroy(key, pid);
    ctx.table.get_mut(ctx.current).expect("caller alive").state = ProcessState::Ready;
}

pub fn sys_semaphore_up(ctx: &mut ServiceContext<'_>) {
    let key = ctx.table.get(ctx.current).expect("caller alive").cpu.ebx as u8;
    let _ = ctx.semaphores.up(key, ctx.table);
    ctx.table.get_mut(ctx.current).expect("caller alive").state = ProcessState::Ready;
}

/// Down: take a credit or stay WAITING until an up wakes the caller.
pub fn sys_semaphore_down(ctx: &mut ServiceContext<'_>) {
    let key = ctx.table.get(ctx.current).expect("caller alive").cpu.ebx as u8;
    match ctx.semaphores.down(key, ctx.current, ctx.table) {
        Ok(true) => {
            ctx.table.get_mut(ctx.current).expect("caller alive").state = ProcessState::Ready;
        }
        Ok(false) => {} // queued; stays WAITING
        Err(_) => {
            let caller = ctx.table.get_mut(ctx.current).expect("caller alive");
            caller.cpu.edx = 0;
            caller.state = ProcessState::Ready;
        }
    }
}

pub fn sys_shm_create(ctx: &mut ServiceContext<'_>) {
    let caller = ctx.table.get(ctx.current).expect("caller alive");
    let (key, size) = (caller.cpu.ebx as u8, caller.cpu.ecx);
    let addr = ctx
        .shm
        .create(key, size, ctx.current, ctx.table, ctx.frames, ctx.phys)
        .unwrap_or(0);
    let caller = ctx.table.get_mut(ctx.current).expect("caller alive");
    caller.cpu.edx = addr;
    caller.state = ProcessState::Ready;
}

pub fn sys_shm_attach(ctx: &mut ServiceContext<'_>) {
    let caller = ctx.table.get(ctx.current).expect("caller alive");
    let (key, mode) = (caller.cpu.ebx as u8, caller.cpu.ecx);
    let addr = ctx
        .shm
        .attach(key, mode, ctx.current, ctx.table, ctx.frames, ctx.phys)
        .unwrap_or(0);
    let caller = ctx.table.get_mut(ctx.current).expect("caller alive");
    caller.cpu.edx = addr;
    caller.state = ProcessState::Ready;
}

pub fn sys_shm_detach(ctx: &mut ServiceContext<'_>) {
    ctx.shm
        .detach(ctx.current, ctx.table, ctx.frames, ctx.phys);
    ctx.table.get_mut(ctx.current).expect("caller alive").state = ProcessState::Ready;
}
