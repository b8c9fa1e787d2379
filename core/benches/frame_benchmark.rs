use criterion::{black_box, criterion_group, criterion_main, Criterion};

use cinnabar_core::{Emulator, EmulatorOptionsBuilder};

/// A ROM-only image spinning an arithmetic loop, enough to keep the whole
/// CPU/PPU/APU pipeline busy without needing a real game.
fn synthetic_rom() -> Vec<u8> {
    let mut rom = vec![0u8; 0x8000];
    let program = [
        0x3C, // INC A
        0x04, // INC B
        0xA8, // XOR B
        0xC3, 0x00, 0x01, // JP 0x0100
    ];
    rom[0x100..0x100 + program.len()].copy_from_slice(&program);
    rom
}

fn frame_benchmark(c: &mut Criterion) {
    c.bench_function("step_frame", |b| {
        let mut emulator = Emulator::new(EmulatorOptionsBuilder::new().build());
        emulator.load_cartridge(&synthetic_rom(), None).unwrap();

        b.iter(|| {
            emulator.step_frame();
            black_box(emulator.framebuffer_crc());
        });
    });

    c.bench_function("step_frame_fetcher_bg", |b| {
        let mut emulator = Emulator::new(
            EmulatorOptionsBuilder::new().use_fetcher_bg(true).build(),
        );
        emulator.load_cartridge(&synthetic_rom(), None).unwrap();

        b.iter(|| {
            emulator.step_frame();
            black_box(emulator.framebuffer_crc());
        });
    });
}

criterion_group!(benches, frame_benchmark);
criterion_main!(benches);
