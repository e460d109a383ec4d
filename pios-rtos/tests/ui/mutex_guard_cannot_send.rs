//! A MutexGuard must not move to another thread: kernel mutexes are owned
//! by the thread that locked them.

use pios_rtos::{Mutex, Timeout};

fn requires_send<T: Send>(_: T) {}

fn main() {
    let mutex: &'static Mutex = Mutex::create().unwrap();
    let guard = mutex.guard(Timeout::Infinite).unwrap();

    requires_send(guard);
}
