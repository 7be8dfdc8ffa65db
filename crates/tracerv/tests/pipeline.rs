//! End-to-end tests: build an on-disk binary layout, synthesize beats, run
//! the bridge, and check the emitted region logs.

use std::io::Cursor;
use std::path::Path;

use tracerv::{
    ClockInfo, OutputFormat, ReadStream, RecordingMmio, STREAM_WIDTH_BYTES, TraceConfig,
    TracerBridge, VALID_MASK,
};

const KERNEL_BASE: u64 = 0xffff_ffff_8000_0000;
const ADDR_MASK_40: u64 = (1 << 40) - 1;

fn write_layout(root: &Path) {
    let kernel_dir = root.join("kernel");
    std::fs::create_dir_all(&kernel_dir).unwrap();
    std::fs::write(
        kernel_dir.join("dwarf"),
        format!(
            "{KERNEL_BASE:x} <start_kernel>:\n\
             /src/main.c:10\n\
             {KERNEL_BASE:x}:\t00000013\tnop\n\
             {:x}:\t00000013\tnop\n\
             {:x} <kernel_helper>:\n\
             /src/main.c:20\n\
             {:x}:\t00000013\tnop\n",
            KERNEL_BASE + 4,
            KERNEL_BASE + 8,
            KERNEL_BASE + 8
        ),
    )
    .unwrap();

    let app_dir = root.join("user").join("app");
    std::fs::create_dir_all(&app_dir).unwrap();
    std::fs::write(
        app_dir.join("dwarf"),
        "0000000000001000 <app_main>:\n\
         /src/app.c:5\n\
         \x20   1000:\t4285\tli\tt0,1\n\
         \x20   1002:\t00c000ef\tjal\tra,100e\n\
         \x20   1006:\t4289\tli\tt0,2\n",
    )
    .unwrap();
    std::fs::write(app_dir.join("hex"), "1000 4285\n1002 00c000ef\n1006 4289\n").unwrap();
}

/// Userspace-layout beat: cycle, slot-0 address, instruction, satp, priv.
fn beat(cycle: u64, iaddr: u64, inst: u64, satp: u64, priv_level: u64) -> [u64; 8] {
    [
        cycle,
        (iaddr & ADDR_MASK_40) | VALID_MASK,
        inst,
        satp,
        priv_level,
        0,
        0,
        0,
    ]
}

fn beats_to_bytes(beats: &[[u64; 8]]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(beats.len() * STREAM_WIDTH_BYTES);
    for group in beats {
        for word in group {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
    }
    bytes
}

fn run_bridge(config: TraceConfig, bytes: Vec<u8>) {
    let mut bridge = TracerBridge::new(
        config,
        ClockInfo::default(),
        ReadStream::new(Cursor::new(bytes)),
        RecordingMmio::default(),
    )
    .expect("bridge construction");
    bridge.init();
    while bridge.tick().expect("tick") > 0 {}
    bridge.flush().expect("flush");
}

fn fireperf_config(root: &Path, prefix: &str) -> TraceConfig {
    TraceConfig {
        tracefile: Some(root.join(prefix).to_string_lossy().into_owned()),
        dwarf_dir: root.to_path_buf(),
        buffer_size: 2,
        ..TraceConfig::default()
    }
}

#[test]
fn test_fireperf_region_logs() {
    let dir = tempfile::tempdir().unwrap();
    write_layout(dir.path());

    let beats = [
        beat(10, KERNEL_BASE, 0x13, 0, 1),
        beat(11, KERNEL_BASE + 4, 0x13, 0, 1),
        beat(12, KERNEL_BASE + 8, 0x13, 0, 1),
        // Unattributable: no user binary holds this pair.
        beat(25, 0x5000, 0xffff, 0x9, 0),
        beat(26, 0x1000, 0x4285, 0x77, 0),
        beat(27, 0x1006, 0x4289, 0x77, 0),
    ];
    run_bridge(fireperf_config(dir.path(), "TRACE"), beats_to_bytes(&beats));

    let kernel = std::fs::read_to_string(dir.path().join("TRACE-kernel-C0")).unwrap();
    assert_eq!(
        kernel,
        "Indent: 1, Start label: start_kernel, At cycle: 10\n\
         Indent: 2, Start label: kernel_helper, At cycle: 12\n\
         Indent: 2, End label: kernel_helper, End cycle: 12\n\
         Indent: 1, End label: start_kernel, End cycle: 11\n"
    );

    let misc = std::fs::read_to_string(dir.path().join("TRACE-misc-C0")).unwrap();
    assert_eq!(
        misc,
        "Indent: 1, Start label: USERSPACE_ALL, At cycle: 25\n\
         Indent: 1, End label: USERSPACE_ALL, End cycle: 25\n"
    );

    let app = std::fs::read_to_string(dir.path().join("TRACE-app-C0")).unwrap();
    assert_eq!(
        app,
        "Indent: 1, Start label: app_main, At cycle: 26\n\
         Indent: 1, End label: app_main, End cycle: 27\n"
    );

    // Final file is the parts concatenated in open order.
    let combined = std::fs::read_to_string(dir.path().join("TRACE-C0")).unwrap();
    assert_eq!(combined, format!("{kernel}{misc}{app}"));
}

#[test]
fn test_fireperf_balanced_regions() {
    let dir = tempfile::tempdir().unwrap();
    write_layout(dir.path());

    // Interleave kernel, user and unattributable tokens.
    let mut beats = Vec::new();
    for round in 0..10u64 {
        beats.push(beat(round * 10, KERNEL_BASE, 0x13, 0, 1));
        beats.push(beat(round * 10 + 1, 0x1000, 0x4285, 0x77, 0));
        beats.push(beat(round * 10 + 2, 0x5000, 0xffff, 0x9, 0));
        beats.push(beat(round * 10 + 3, KERNEL_BASE + 8, 0x13, 0, 1));
    }
    run_bridge(fireperf_config(dir.path(), "TRACE"), beats_to_bytes(&beats));

    for part in ["TRACE-kernel-C0", "TRACE-misc-C0", "TRACE-app-C0"] {
        let text = std::fs::read_to_string(dir.path().join(part)).unwrap();
        let starts = text.matches("Start label").count();
        let ends = text.matches("End label").count();
        assert_eq!(starts, ends, "unbalanced regions in {part}");
    }
}

#[test]
fn test_human_readable_output() {
    let dir = tempfile::tempdir().unwrap();
    let beats = [
        beat(16, KERNEL_BASE, 0x13, 0x77, 1),
        // Invalid slot: no output.
        [17, 0, 0, 0, 0, 0, 0, 0],
    ];
    let config = TraceConfig {
        tracefile: Some(dir.path().join("TRACE").to_string_lossy().into_owned()),
        output_format: OutputFormat::HumanReadable,
        ..TraceConfig::default()
    };
    run_bridge(config, beats_to_bytes(&beats));

    let text = std::fs::read_to_string(dir.path().join("TRACE-C0")).unwrap();
    assert_eq!(
        text,
        "Cycle: 0000000000000016 I0: ffffffff80000000 Inst: 0000000000000013 \
         satp: 0000000000000077 priv: 0000000000000001\n"
    );
}

#[test]
fn test_machine_mode_human_readable_stops_at_invalid_slot() {
    let dir = tempfile::tempdir().unwrap();
    let slot = |addr: u64| (addr & ADDR_MASK_40) | VALID_MASK;
    let beats = [[
        5,
        slot(KERNEL_BASE),
        slot(KERNEL_BASE + 4),
        0, // invalid: later valid slots must be ignored
        slot(KERNEL_BASE + 8),
        0,
        0,
        0,
    ]];
    let config = TraceConfig {
        tracefile: Some(dir.path().join("TRACE").to_string_lossy().into_owned()),
        output_format: OutputFormat::HumanReadable,
        userspace: false,
        ..TraceConfig::default()
    };
    run_bridge(config, beats_to_bytes(&beats));

    let text = std::fs::read_to_string(dir.path().join("TRACE-C0")).unwrap();
    assert_eq!(
        text,
        "Cycle: 0000000000000005 I0: 000000ff80000000\n\
         Cycle: 0000000000000005 I1: 000000ff80000004\n"
    );
}

#[test]
fn test_test_output_reference_format() {
    let dir = tempfile::tempdir().unwrap();
    let beats = [[0u64, 1, 2, 3, 4, 5, 6, 7]];
    let config = TraceConfig {
        tracefile: Some(dir.path().join("TRACE").to_string_lossy().into_owned()),
        output_format: OutputFormat::HumanReadable,
        test_output: true,
        ..TraceConfig::default()
    };
    run_bridge(config, beats_to_bytes(&beats));

    let text = std::fs::read_to_string(dir.path().join("TRACE-C0")).unwrap();
    assert_eq!(
        text,
        "0000000000000007000000000000000600000000000000050000000000000004\
         0000000000000003000000000000000200000000000000010000000000000000\n"
    );
}

#[test]
fn test_raw_output_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let beats = [beat(1, 0x1234, 0xabcd, 0x5, 0), beat(2, 0x5678, 0xef01, 0x5, 0)];
    let bytes = beats_to_bytes(&beats);
    let config = TraceConfig {
        tracefile: Some(dir.path().join("TRACE").to_string_lossy().into_owned()),
        output_format: OutputFormat::Raw,
        ..TraceConfig::default()
    };
    run_bridge(config, bytes.clone());

    let written = std::fs::read(dir.path().join("TRACE-C0")).unwrap();
    assert_eq!(written, bytes);
}

#[test]
fn test_fireperf_side_log() {
    let dir = tempfile::tempdir().unwrap();
    write_layout(dir.path());

    let log_path = dir.path().join("token.log");
    let mut config = fireperf_config(dir.path(), "TRACE");
    config.fireperf_log = Some(log_path.clone());
    run_bridge(config, beats_to_bytes(&[beat(33, 0x1000, 0x4285, 0x77, 0)]));

    let log = std::fs::read_to_string(log_path).unwrap();
    assert_eq!(
        log,
        "Cycle: 0000000000000033 I0: 0000000000001000 Inst: 0000000000004285 \
         satp: 0000000000000077 priv: 0000000000000000\n"
    );
}

#[test]
fn test_fireperf_requires_kernel_listing() {
    let dir = tempfile::tempdir().unwrap();
    // No layout written: construction must fail loudly.
    let config = fireperf_config(dir.path(), "TRACE");
    let result = TracerBridge::new(
        config,
        ClockInfo::default(),
        ReadStream::new(Cursor::new(Vec::new())),
        RecordingMmio::default(),
    );
    assert!(result.is_err());
}

#[test]
fn test_fireperf_requires_dwarf_file_name() {
    let dir = tempfile::tempdir().unwrap();
    write_layout(dir.path());
    let mut config = fireperf_config(dir.path(), "TRACE");
    config.dwarf_file_name = String::new();
    let result = TracerBridge::new(
        config,
        ClockInfo::default(),
        ReadStream::new(Cursor::new(Vec::new())),
        RecordingMmio::default(),
    );
    assert!(result.is_err());
}
