use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use crate::analysis::error::FlowPhase;

#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Started,
    Succeeded,
    /// 任务仍在处理中或结果尚不可用
    Pending,
    /// 某个结果来源本轮取数失败，会继续尝试下一个来源
    SourceFailed { source: &'static str, reason: String },
    Failed { reason: String },
}

/// 流程事件，替代散落各处的调试输出
#[derive(Debug, Clone, PartialEq)]
pub struct FlowEvent {
    pub phase: FlowPhase,
    pub attempt: Option<u32>,
    pub outcome: EventOutcome,
    pub at: DateTime<Utc>,
}

impl FlowEvent {
    pub fn new(phase: FlowPhase, attempt: Option<u32>, outcome: EventOutcome) -> Self {
        Self {
            phase,
            attempt,
            outcome,
            at: Utc::now(),
        }
    }
}

pub trait FlowObserver: Send + Sync {
    fn on_event(&self, event: &FlowEvent);
}

impl<F> FlowObserver for F
where
    F: Fn(&FlowEvent) + Send + Sync,
{
    fn on_event(&self, event: &FlowEvent) {
        self(event)
    }
}

pub type SharedObserver = Arc<dyn FlowObserver>;

/// 默认观察者：把事件写入 tracing 日志
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl FlowObserver for TracingObserver {
    fn on_event(&self, event: &FlowEvent) {
        let attempt = event
            .attempt
            .map(|a| format!(" #{}", a))
            .unwrap_or_default();
        match &event.outcome {
            EventOutcome::Started => debug!("[{}{}] 开始", event.phase, attempt),
            EventOutcome::Succeeded => info!("✅ [{}{}] 完成", event.phase, attempt),
            EventOutcome::Pending => info!("⏳ [{}{}] 结果尚未就绪", event.phase, attempt),
            EventOutcome::SourceFailed { source, reason } => {
                warn!("⚠️ [{}{}] 来源 {} 取数失败: {}", event.phase, attempt, source, reason)
            }
            EventOutcome::Failed { reason } => {
                warn!("❌ [{}{}] 失败: {}", event.phase, attempt, reason)
            }
        }
    }
}

/// 同时通知多个观察者
#[derive(Clone, Default)]
pub struct Observers {
    inner: Vec<SharedObserver>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, observer: SharedObserver) {
        self.inner.push(observer);
    }

    pub fn emit(&self, phase: FlowPhase, attempt: Option<u32>, outcome: EventOutcome) {
        if self.inner.is_empty() {
            return;
        }
        let event = FlowEvent::new(phase, attempt, outcome);
        for observer in &self.inner {
            observer.on_event(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_closure_observer_receives_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut observers = Observers::new();
        observers.push(Arc::new(move |e: &FlowEvent| {
            sink.lock().unwrap().push((e.phase, e.attempt));
        }));
        observers.push(Arc::new(TracingObserver));

        observers.emit(FlowPhase::Poll, Some(2), EventOutcome::Pending);
        observers.emit(FlowPhase::Submit, None, EventOutcome::Succeeded);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(FlowPhase::Poll, Some(2)), (FlowPhase::Submit, None)]
        );
    }
}
