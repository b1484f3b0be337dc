use opemu_decoder::{decode, DecodeMode};
use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};

struct CountingAlloc;

static ALLOCATIONS: AtomicUsize = AtomicUsize::new(0);

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) };
    }
}

#[global_allocator]
static GLOBAL: CountingAlloc = CountingAlloc;

#[test]
fn decode_does_not_allocate() {
    let samples: [&[u8]; 4] = [
        &[0xC4, 0xE2, 0x60, 0xF2, 0xC1],                   // andn eax, ebx, ecx
        &[0xC4, 0x02, 0xA2, 0xF5, 0x54, 0xEC, 0x40],       // pext r10, r11, [r12+r13*8+0x40]
        &[0x66, 0x0F, 0x3A, 0x63, 0x0D, 0x10, 0, 0, 0, 0x0C], // pcmpistri xmm1, [rip+0x10], 0x0C
        &[0x0F, 0x0B],                                     // ud2, rejected
    ];

    let _ = decode(samples[0], DecodeMode::Bits64).expect("warmup decode");
    ALLOCATIONS.store(0, Ordering::Relaxed);

    for _ in 0..10_000 {
        for bytes in samples {
            let _ = decode(bytes, DecodeMode::Bits64);
        }
    }

    assert_eq!(
        ALLOCATIONS.load(Ordering::Relaxed),
        0,
        "decoder allocated while decoding"
    );
}
