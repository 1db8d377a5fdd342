/*
 * x86_64 reference architecture adapter
 *
 * Interrupt masking is real, backed by the `x86_64` crate, which is all the
 * test suite and a host-side harness actually need: they drive scheduling
 * decisions and IPC directly rather than performing a literal context
 * switch. The register-save/restore switch and the initial stack frame
 * layout are genuinely target- and calling-convention-specific assembly
 * that belongs in the embedding firmware, not in this crate; `stack_init`,
 * `first_switch` and `switch` are therefore left for a concrete embedder to
 * override or link in, and panic if reached from this reference adapter.
 */

pub mod interrupts;

use crate::arch::Arch;

pub struct X86_64;

impl Arch for X86_64 {
    type Mask = bool;

    fn critical_enter() -> bool {
        let were_enabled = interrupts::are_enabled();
        if were_enabled {
            interrupts::disable();
        }
        were_enabled
    }

    fn critical_exit(were_enabled: bool) {
        if were_enabled {
            interrupts::enable();
        }
    }

    unsafe fn stack_init(_stack: &mut [usize], _entry: fn(usize), _arg: usize) -> usize {
        unimplemented!(
            "stack frame layout is calling-convention specific and supplied by the embedding firmware"
        )
    }

    unsafe fn first_switch(_sp: usize) -> ! {
        unimplemented!("first context switch is supplied by the embedding firmware")
    }

    unsafe fn switch(_save_sp: *mut usize, _resume_sp: usize) {
        unimplemented!("context switch is supplied by the embedding firmware")
    }
}
