//! The critical section is released by the thread that entered it.

use pios_rtos::critical;
use pios_rtos::DefaultKernel;

fn requires_send<T: Send>(_: T) {}

fn main() {
    let guard = critical::lock::<DefaultKernel>();

    requires_send(guard);
}
