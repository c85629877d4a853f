// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Handoff to the application and the fatal halt.

use crispy_flash::FlashRegion;

const RAM_START: u32 = 0x2000_0000;
const RAM_END: u32 = 0x2004_2000;

struct VectorTable {
    initial_sp: u32,
    reset_vector: u32,
}

impl VectorTable {
    unsafe fn read_from(addr: u32) -> Self {
        Self {
            initial_sp: (addr as *const u32).read_volatile(),
            reset_vector: (addr as *const u32).offset(1).read_volatile(),
        }
    }

    /// Stack in RAM and a Thumb reset handler inside the application region.
    fn is_valid_for(&self, app: &FlashRegion) -> bool {
        (RAM_START..=RAM_END).contains(&self.initial_sp)
            && self.reset_vector & 1 == 1
            && app.contains(self.reset_vector & !1)
    }
}

/// Jump to the application whose vector table starts at `vector_table`.
///
/// The hardware watchdog keeps running: an application that hangs before
/// confirming its boot gets reset back into the bootloader.
pub fn jump(vector_table: u32, app: &FlashRegion) -> ! {
    let vt = unsafe { VectorTable::read_from(vector_table) };
    if !vt.is_valid_for(app) {
        defmt::error!(
            "Invalid vector table at 0x{:08x}: sp=0x{:08x} reset=0x{:08x}",
            vector_table,
            vt.initial_sp,
            vt.reset_vector
        );
        halt();
    }

    defmt::println!("Jumping to application at 0x{:08x}", vector_table);
    unsafe {
        prepare_for_firmware_handoff();
        relocate_vector_table(vector_table);
        jump_to_firmware(vt.initial_sp, vt.reset_vector)
    }
}

/// Stop here without feeding the watchdog.
pub fn halt() -> ! {
    defmt::println!("Halted");
    loop {
        cortex_m::asm::wfi();
    }
}

/// Prepare the system for firmware handoff.
/// Clocks are left configured for the application to take over.
unsafe fn prepare_for_firmware_handoff() {
    // Disable all interrupts
    cortex_m::interrupt::disable();

    // Clear all pending interrupts in NVIC
    const NVIC_ICPR: *mut u32 = 0xE000_E280 as *mut u32;
    NVIC_ICPR.write_volatile(0xFFFF_FFFF);

    // Disable all NVIC interrupts
    const NVIC_ICER: *mut u32 = 0xE000_E180 as *mut u32;
    NVIC_ICER.write_volatile(0xFFFF_FFFF);
}

unsafe fn relocate_vector_table(vector_table: u32) {
    const SCB_VTOR: *mut u32 = 0xE000_ED08 as *mut u32;
    SCB_VTOR.write_volatile(vector_table);

    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}

unsafe fn jump_to_firmware(initial_sp: u32, reset_vector: u32) -> ! {
    core::arch::asm!(
        "msr msp, {sp}",
        "cpsie i",
        "bx {reset}",
        sp = in(reg) initial_sp,
        reset = in(reg) reset_vector,
        options(noreturn)
    );
}
