//! Example firmware: three periodic tasks scheduled by earliest deadline.
//!
//! | Task      | Deadline | Behavior                              |
//! |-----------|----------|----------------------------------------|
//! | `fast_a`  | 4 ms     | increments a counter, then `period_yield` |
//! | `fast_b`  | 4 ms     | same shape as `fast_a`, lower TID wins ties |
//! | `slow`    | 12 ms    | does more work, yields less often      |
//!
//! `fast_a` and `fast_b` share a deadline, so the scheduler alternates
//! between them by TID; `slow` only runs when neither is ready.

#![no_std]
#![no_main]

use cortex_m_rt::entry;
use defmt_rtt as _;
use panic_probe as _;

use edf_kernel::kernel;

extern "C" fn fast_a(arg: *mut u8) {
    let counter = arg as *mut u32;
    loop {
        unsafe { *counter = (*counter).wrapping_add(1) };
        kernel::period_yield();
    }
}

extern "C" fn fast_b(arg: *mut u8) {
    let counter = arg as *mut u32;
    loop {
        unsafe { *counter = (*counter).wrapping_add(1) };
        kernel::period_yield();
    }
}

extern "C" fn slow(_arg: *mut u8) {
    loop {
        let mut acc: u32 = 0;
        for _ in 0..2000 {
            acc = acc.wrapping_add(1);
        }
        defmt::info!("slow task heartbeat, acc={}", acc);
        kernel::period_yield();
    }
}

static mut COUNTER_A: u32 = 0;
static mut COUNTER_B: u32 = 0;

#[entry]
fn main() -> ! {
    let cp = cortex_m::Peripherals::take().unwrap();

    kernel::init();
    kernel::mem_init().expect("buddy allocator init failed");

    let counter_a = unsafe { core::ptr::addr_of_mut!(COUNTER_A) } as *mut u8;
    let counter_b = unsafe { core::ptr::addr_of_mut!(COUNTER_B) } as *mut u8;

    kernel::create_deadline_task(4, fast_a, counter_a, 512).expect("create fast_a failed");
    kernel::create_deadline_task(4, fast_b, counter_b, 512).expect("create fast_b failed");
    kernel::create_deadline_task(12, slow, core::ptr::null_mut(), 512).expect("create slow failed");

    defmt::info!("starting EDF scheduler");
    let err = kernel::start(cp);
    defmt::panic!("kernel::start returned: {}", err);
}
