#![allow(dead_code)]

use std::sync::Arc;

use llgym::service::{HostConfig, SessionHost};
use llgym::session::SessionOptions;
use llgym_benchmark::{Benchmark, BenchmarkFactory, BenchmarkUri};

/// A function with a stack slot, a dead multiply and an `add 0`.
pub const REDUNDANT_IR: &str = r"
define i32 @redundant(i32 %a, i32 %b) {
entry:
  %slot = alloca i32
  store i32 %a, ptr %slot
  %x = load i32, ptr %slot
  %unused = mul i32 %x, %b
  %same = add i32 %x, 0
  %sum = add i32 %same, %b
  ret i32 %sum
}
";

/// A counted loop accumulating its induction variable.
pub const LOOP_IR: &str = r"
define i32 @sum_to(i32 %n) {
entry:
  br label %loop

loop:
  %i = phi i32 [ 0, %entry ], [ %next, %loop ]
  %acc = phi i32 [ 0, %entry ], [ %acc.next, %loop ]
  %acc.next = add i32 %acc, %i
  %next = add i32 %i, 1
  %done = icmp sge i32 %next, %n
  br i1 %done, label %exit, label %loop

exit:
  ret i32 %acc.next
}
";

/// Two branches ending in the same computation, so there is code to sink.
pub const DIAMOND_IR: &str = r"
define i32 @diamond(i1 %c, i32 %a, i32 %b) {
entry:
  br i1 %c, label %left, label %right

left:
  %l = add i32 %a, %b
  br label %join

right:
  %r = add i32 %a, %b
  br label %join

join:
  %v = phi i32 [ %l, %left ], [ %r, %right ]
  ret i32 %v
}
";

pub fn uri(name: &str) -> BenchmarkUri {
    BenchmarkUri::new("benchmark", "tests", 0, Some(name.to_string()))
}

pub fn benchmark(name: &str, ir: &str) -> Benchmark {
    Benchmark::from_ir(uri(name), ir)
}

/// A factory holding `redundant`, `loop` and `diamond` under `benchmark://tests-v0`.
pub fn factory() -> Arc<BenchmarkFactory> {
    let factory = BenchmarkFactory::new();
    factory.add_benchmark(benchmark("redundant", REDUNDANT_IR));
    factory.add_benchmark(benchmark("loop", LOOP_IR));
    factory.add_benchmark(benchmark("diamond", DIAMOND_IR));
    Arc::new(factory)
}

pub fn host_in(root: &tempfile::TempDir) -> SessionHost {
    host_with(root, |_| {})
}

pub fn host_with(root: &tempfile::TempDir, configure: impl FnOnce(&mut HostConfig)) -> SessionHost {
    let mut config = HostConfig {
        session: SessionOptions {
            working_root: Some(root.path().to_path_buf()),
        },
        ..HostConfig::default()
    };
    configure(&mut config);
    SessionHost::new(factory(), config)
}
