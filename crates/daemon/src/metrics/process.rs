// Process-level metrics (memory, CPU, start time) sampled on each scrape.

use std::sync::Mutex;

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use super::push_header;

pub struct ProcessMetrics {
    pid: Option<Pid>,
    system: Mutex<System>,
}

impl ProcessMetrics {
    pub fn for_current_process() -> Self {
        Self { pid: sysinfo::get_current_pid().ok(), system: Mutex::new(System::new()) }
    }

    pub fn render(&self, output: &mut String) {
        let sample = self.sample();

        push_header(
            output,
            "process_resident_memory_bytes",
            "Resident memory size in bytes.",
            "gauge",
        );
        if let Some(sample) = &sample {
            output.push_str(&format!("process_resident_memory_bytes {}\n", sample.resident_bytes));
        }

        push_header(
            output,
            "process_virtual_memory_bytes",
            "Virtual memory size in bytes.",
            "gauge",
        );
        if let Some(sample) = &sample {
            output.push_str(&format!("process_virtual_memory_bytes {}\n", sample.virtual_bytes));
        }

        push_header(
            output,
            "process_cpu_usage_percent",
            "CPU usage since the previous scrape.",
            "gauge",
        );
        if let Some(sample) = &sample {
            output.push_str(&format!("process_cpu_usage_percent {}\n", sample.cpu_percent));
        }

        push_header(
            output,
            "process_start_time_seconds",
            "Start time of the process since unix epoch in seconds.",
            "gauge",
        );
        if let Some(sample) = &sample {
            output.push_str(&format!("process_start_time_seconds {}\n", sample.start_time_secs));
        }
    }

    fn sample(&self) -> Option<ProcessSample> {
        let pid = self.pid?;
        let mut system = self.system.lock().expect("process metrics lock poisoned");
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory().with_cpu(),
        );

        system.process(pid).map(|process| ProcessSample {
            resident_bytes: process.memory(),
            virtual_bytes: process.virtual_memory(),
            cpu_percent: process.cpu_usage(),
            start_time_secs: process.start_time(),
        })
    }
}

struct ProcessSample {
    resident_bytes: u64,
    virtual_bytes: u64,
    cpu_percent: f32,
    start_time_secs: u64,
}
