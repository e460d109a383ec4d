//! The interrupt-context token does not outlive the handler.

use pios_rtos::kernel::hosted::HostedKernel;
use pios_rtos::IsrContext;

fn main() {
    let escaped: &IsrContext<'_> = HostedKernel::interrupt(|cx| cx);
    let _ = escaped;
}
