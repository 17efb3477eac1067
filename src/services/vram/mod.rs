//! VRAM collaborator: an optional GPU-memory admission gate. Polled before
//! each ASR invocation and released after, so CPU-only adapters can be a
//! pure no-op.

use async_trait::async_trait;

/// Queries and manages GPU memory admission for ASR invocations.
#[async_trait]
pub trait VramGate: Send + Sync {
    /// Free VRAM currently available, in gigabytes. `None` if the adapter
    /// has no real query mechanism (e.g. CPU-only).
    async fn free_vram_gb(&self) -> Option<f64>;

    /// Release any GPU cache held by the last ASR invocation. A no-op on
    /// adapters without a real query mechanism.
    async fn release(&self) {}
}

/// No-op gate: always reports no VRAM constraint, so admission never blocks.
pub struct NoopVramGate;

#[async_trait]
impl VramGate for NoopVramGate {
    async fn free_vram_gb(&self) -> Option<f64> {
        None
    }
}

/// Wait until `free_vram_gb() >= floor_gb` or `timeout_secs` elapses
/// (`0` disables the timeout), polling every `poll_interval_ms`. Warns once
/// if the floor is never reached before returning. A `floor_gb` of `None`
/// (no configured admission threshold) returns immediately.
pub async fn wait_for_vram(
    gate: &dyn VramGate,
    floor_gb: Option<f64>,
    poll_interval_ms: u64,
    timeout_secs: u64,
) {
    let Some(floor) = floor_gb else {
        return;
    };

    let start = std::time::Instant::now();
    let mut warned = false;
    loop {
        match gate.free_vram_gb().await {
            Some(free) if free >= floor => return,
            None => return,
            Some(_) => {}
        }
        if timeout_secs > 0 && start.elapsed().as_secs() >= timeout_secs {
            if !warned {
                log::warn!("timed out waiting for {floor:.1} GB free VRAM; proceeding anyway");
            }
            return;
        }
        if !warned {
            log::warn!("waiting for {floor:.1} GB free VRAM before starting ASR");
            warned = true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(poll_interval_ms)).await;
    }
}

/// Deterministic test adapter reporting a fixed free-VRAM value.
pub struct TestVramGate {
    free_gb: Option<f64>,
}

impl TestVramGate {
    /// Build a gate that always reports `free_gb`.
    pub fn new(free_gb: Option<f64>) -> Self {
        Self { free_gb }
    }
}

#[async_trait]
impl VramGate for TestVramGate {
    async fn free_vram_gb(&self) -> Option<f64> {
        self.free_gb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_returns_immediately_without_configured_floor() {
        let gate = TestVramGate::new(Some(0.0));
        wait_for_vram(&gate, None, 10, 1).await;
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_floor_already_met() {
        let gate = TestVramGate::new(Some(8.0));
        wait_for_vram(&gate, Some(4.0), 10, 1).await;
    }

    #[tokio::test]
    async fn noop_gate_reports_no_constraint() {
        let gate = NoopVramGate;
        assert_eq!(gate.free_vram_gb().await, None);
        gate.release().await;
    }
}
