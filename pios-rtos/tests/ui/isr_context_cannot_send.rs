//! The interrupt-context token cannot be handed to a thread.

use pios_rtos::kernel::hosted::HostedKernel;

fn requires_send<T: Send>(_: T) {}

fn main() {
    HostedKernel::interrupt(|cx| requires_send(cx));
}
