//! Floating point setup for the process thread.

#[cfg(target_arch = "x86_64")]
const FLUSH_TO_ZERO: u32 = 0x8000;
#[cfg(target_arch = "x86_64")]
const DENORMALS_ARE_ZERO: u32 = 0x0040;

/// Set flush-to-zero and denormals-are-zero on the calling thread.
#[cfg(target_arch = "x86_64")]
#[allow(deprecated)]
pub(crate) fn enable_denormal_protection() {
    use std::arch::x86_64::{_mm_getcsr, _mm_setcsr};

    // SAFETY: SSE2 is part of the x86_64 baseline and both bits are defined
    // on every x86_64 CPU.
    unsafe { _mm_setcsr(_mm_getcsr() | FLUSH_TO_ZERO | DENORMALS_ARE_ZERO) }
}

#[cfg(not(target_arch = "x86_64"))]
pub(crate) fn enable_denormal_protection() {}

#[cfg(all(test, target_arch = "x86_64"))]
mod tests {
    use super::*;

    #[test]
    #[allow(deprecated)]
    fn test_sets_mxcsr_bits_on_current_thread() {
        std::thread::spawn(|| {
            enable_denormal_protection();
            let csr = unsafe { std::arch::x86_64::_mm_getcsr() };
            assert_eq!(csr & FLUSH_TO_ZERO, FLUSH_TO_ZERO);
            assert_eq!(csr & DENORMALS_ARE_ZERO, DENORMALS_ARE_ZERO);
        })
        .join()
        .unwrap();
    }
}
