//! Best-effort type enrichment for fields and parameters left `Unknown` by
//! static extraction.
//!
//! Batches are sent with a cap on in-flight requests and applied as each
//! one completes, so a timeout or cancellation keeps everything that has
//! already arrived.

pub mod client;
pub mod service;

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EnrichmentSettings;
use crate::model::{ClassEntity, Diagnostic, TypeRef};

pub use client::{ChatClient, ChatClientConfig, ChatMessage};
pub use service::{ChatInferenceService, InferenceRequest, InferenceResponse, TypeInferenceService};

/// Outcome counters for one enrichment pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentReport {
    pub requested: usize,
    pub resolved: usize,
    pub failed_batches: usize,
    pub timed_out: bool,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Field { class: usize, field: usize },
    Param { class: usize, method: usize, param: usize },
}

pub struct TypeEnricher {
    service: Arc<dyn TypeInferenceService>,
    settings: EnrichmentSettings,
}

impl TypeEnricher {
    pub fn new(service: Arc<dyn TypeInferenceService>, settings: EnrichmentSettings) -> Self {
        Self { service, settings }
    }

    /// Replaces `Unknown` field and parameter types in place.
    ///
    /// Never fails: service errors, timeouts and low-confidence answers leave
    /// the slot `Unknown` and are reported through `diagnostics`.
    pub async fn enrich(
        &self,
        classes: &mut [ClassEntity],
        diagnostics: &mut Vec<Diagnostic>,
        cancel: &CancellationToken,
    ) -> EnrichmentReport {
        let (requests, slots) = collect_requests(classes);
        let mut report = EnrichmentReport {
            requested: requests.len(),
            ..EnrichmentReport::default()
        };
        if requests.is_empty() {
            debug!("No unknown types to enrich");
            return report;
        }

        let batch_size = self.settings.batch_size.max(1);
        let batches: Vec<Vec<InferenceRequest>> =
            requests.chunks(batch_size).map(<[_]>::to_vec).collect();
        info!(
            "Enriching {} slots in {} batches ({} in flight)",
            requests.len(),
            batches.len(),
            self.settings.max_in_flight
        );

        let request_timeout = self.settings.request_timeout();
        let deadline = tokio::time::Instant::now() + self.settings.overall_timeout();
        let mut pending = stream::iter(batches.into_iter().enumerate())
            .map(|(index, batch)| {
                let service = Arc::clone(&self.service);
                async move {
                    let outcome = tokio::time::timeout(request_timeout, service.infer(&batch)).await;
                    (index, outcome)
                }
            })
            .buffer_unordered(self.settings.max_in_flight.max(1));

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("Enrichment cancelled; keeping {} resolved slots", report.resolved);
                    report.cancelled = true;
                    break;
                }
                next = tokio::time::timeout_at(deadline, pending.next()) => match next {
                    Err(_) => {
                        let diagnostic = Diagnostic::enrichment(format!(
                            "overall timeout of {}s reached; unresolved slots stay Unknown",
                            self.settings.overall_timeout_secs
                        ));
                        warn!("{}", diagnostic);
                        diagnostics.push(diagnostic);
                        report.timed_out = true;
                        break;
                    }
                    Ok(None) => break,
                    Ok(Some((index, Ok(Ok(responses))))) => {
                        let applied = self.apply(classes, &slots, &responses);
                        debug!("Batch {} resolved {} of {} answers", index, applied, responses.len());
                        report.resolved += applied;
                    }
                    Ok(Some((index, Ok(Err(err))))) => {
                        let diagnostic = Diagnostic::enrichment(format!("batch {} failed: {}", index, err));
                        warn!("{}", diagnostic);
                        diagnostics.push(diagnostic);
                        report.failed_batches += 1;
                    }
                    Ok(Some((index, Err(_)))) => {
                        let diagnostic = Diagnostic::enrichment(format!(
                            "batch {} timed out after {}s",
                            index, self.settings.request_timeout_secs
                        ));
                        warn!("{}", diagnostic);
                        diagnostics.push(diagnostic);
                        report.failed_batches += 1;
                    }
                },
            }
        }

        info!(
            "Enrichment finished: {}/{} resolved, {} failed batches",
            report.resolved, report.requested, report.failed_batches
        );
        report
    }

    fn apply(
        &self,
        classes: &mut [ClassEntity],
        slots: &HashMap<String, Slot>,
        responses: &[InferenceResponse],
    ) -> usize {
        let mut applied = 0;
        for response in responses {
            let Some(type_name) = response.accepted_type(self.settings.min_confidence) else {
                continue;
            };
            let Some(slot) = slots.get(&response.slot) else {
                debug!("Ignoring answer for unknown slot {}", response.slot);
                continue;
            };
            let target = match *slot {
                Slot::Field { class, field } => classes
                    .get_mut(class)
                    .and_then(|c| c.fields.get_mut(field))
                    .map(|f| &mut f.type_ref),
                Slot::Param { class, method, param } => classes
                    .get_mut(class)
                    .and_then(|c| c.methods.get_mut(method))
                    .and_then(|m| m.params.get_mut(param))
                    .map(|p| &mut p.type_ref),
            };
            if let Some(type_ref) = target {
                if type_ref.is_unknown() {
                    *type_ref = TypeRef::named(type_name);
                    applied += 1;
                }
            }
        }
        applied
    }
}

/// Every `Unknown` field and parameter, in class/source order.
///
/// Slot ids are unique: a repeated method name (overloads, redefinitions)
/// is written `method#n` for its n-th repeat, and any remaining clash gets
/// a trailing `#n`.
fn collect_requests(classes: &[ClassEntity]) -> (Vec<InferenceRequest>, HashMap<String, Slot>) {
    let mut requests = Vec::new();
    let mut slots = HashMap::new();

    for (class_index, class) in classes.iter().enumerate() {
        let header = if class.bases.is_empty() {
            format!("class {}", class.name)
        } else {
            format!("class {}({})", class.name, class.bases.join(", "))
        };

        for (field_index, field) in class.fields.iter().enumerate() {
            if !field.type_ref.is_unknown() {
                continue;
            }
            let slot = claim_slot_id(&slots, format!("{}.{}", class.qualified_name, field.name));
            let line = field.hint.clone().unwrap_or_else(|| field.name.clone());
            slots.insert(
                slot.clone(),
                Slot::Field {
                    class: class_index,
                    field: field_index,
                },
            );
            requests.push(InferenceRequest {
                slot,
                class_name: class.name.clone(),
                member: field.name.clone(),
                snippet: format!("{}:\n    {}", header, line),
            });
        }

        let mut seen_methods: HashMap<&str, usize> = HashMap::new();
        for (method_index, method) in class.methods.iter().enumerate() {
            let repeat = seen_methods.entry(method.name.as_str()).or_insert(0);
            let method_key = if *repeat == 0 {
                method.name.clone()
            } else {
                format!("{}#{}", method.name, repeat)
            };
            *repeat += 1;

            for (param_index, param) in method.params.iter().enumerate() {
                if !param.type_ref.is_unknown() {
                    continue;
                }
                let slot = claim_slot_id(
                    &slots,
                    format!("{}.{}.{}", class.qualified_name, method_key, param.name),
                );
                slots.insert(
                    slot.clone(),
                    Slot::Param {
                        class: class_index,
                        method: method_index,
                        param: param_index,
                    },
                );
                requests.push(InferenceRequest {
                    slot,
                    class_name: class.name.clone(),
                    member: format!("{}.{}", method.name, param.name),
                    snippet: format!("{}:\n    {}", header, method.display_params()),
                });
            }
        }
    }

    (requests, slots)
}

fn claim_slot_id(slots: &HashMap<String, Slot>, id: String) -> String {
    if !slots.contains_key(&id) {
        return id;
    }
    let mut n = 1;
    loop {
        let candidate = format!("{}#{}", id, n);
        if !slots.contains_key(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ArchError, Result};
    use crate::model::{MethodSignature, Parameter};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeService {
        answers: HashMap<String, (String, f32)>,
        fail_slots_containing: Option<String>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl FakeService {
        fn new(answers: &[(&str, &str, f32)]) -> Self {
            Self {
                answers: answers
                    .iter()
                    .map(|(slot, ty, c)| (slot.to_string(), (ty.to_string(), *c)))
                    .collect(),
                fail_slots_containing: None,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TypeInferenceService for FakeService {
        async fn infer(&self, batch: &[InferenceRequest]) -> Result<Vec<InferenceResponse>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if let Some(marker) = &self.fail_slots_containing {
                if batch.iter().any(|r| r.slot.contains(marker.as_str())) {
                    return Err(ArchError::Enrichment("service unavailable".to_string()));
                }
            }
            Ok(batch
                .iter()
                .filter_map(|r| {
                    self.answers.get(&r.slot).map(|(ty, c)| InferenceResponse {
                        slot: r.slot.clone(),
                        type_name: Some(ty.clone()),
                        confidence: *c,
                    })
                })
                .collect())
        }
    }

    fn sample_classes() -> Vec<ClassEntity> {
        let mut foo = ClassEntity::new("Foo", "a.Foo", "a.py", "python", 1);
        foo.bases.push("Base".to_string());
        foo.add_field("x", TypeRef::Unknown, Some("self.x = build()".to_string()));
        foo.add_field("y", TypeRef::named("int"), None);
        foo.methods.push(MethodSignature {
            name: "run".to_string(),
            params: vec![
                Parameter { name: "ctx".to_string(), type_ref: TypeRef::Unknown },
                Parameter { name: "n".to_string(), type_ref: TypeRef::named("int") },
            ],
            returns: Some(TypeRef::Unknown),
            decorators: Vec::new(),
            description: None,
        });
        let mut bar = ClassEntity::new("Bar", "b.Bar", "b.py", "python", 1);
        bar.add_field("z", TypeRef::Unknown, None);
        vec![foo, bar]
    }

    fn settings() -> EnrichmentSettings {
        EnrichmentSettings {
            enabled: true,
            batch_size: 1,
            ..EnrichmentSettings::default()
        }
    }

    #[test]
    fn test_collect_requests_only_unknown_slots() {
        let (requests, slots) = collect_requests(&sample_classes());
        let ids: Vec<_> = requests.iter().map(|r| r.slot.as_str()).collect();
        assert_eq!(ids, vec!["a.Foo.x", "a.Foo.run.ctx", "b.Bar.z"]);
        assert_eq!(slots.len(), 3);
        assert_eq!(requests[0].class_name, "Foo");
        assert!(requests[0].snippet.contains("class Foo(Base)"));
        assert!(requests[0].snippet.contains("self.x = build()"));
        assert_eq!(requests[1].member, "run.ctx");
    }

    fn repeated_method(name: &str) -> MethodSignature {
        MethodSignature {
            name: name.to_string(),
            params: vec![Parameter { name: "data".to_string(), type_ref: TypeRef::Unknown }],
            returns: None,
            decorators: Vec::new(),
            description: None,
        }
    }

    #[test]
    fn test_slot_ids_unique_for_repeated_methods() {
        let mut proc = ClassEntity::new("Proc", "p.Proc", "p.py", "python", 1);
        proc.methods.push(repeated_method("process"));
        proc.methods.push(repeated_method("process"));
        proc.methods.push(repeated_method("process"));
        // nested class `p.Proc.process` with a field named like the parameter
        let mut nested = ClassEntity::new("process", "p.Proc.process", "p.py", "python", 9);
        nested.add_field("data", TypeRef::Unknown, None);

        let (requests, slots) = collect_requests(&[proc, nested]);
        let ids: Vec<_> = requests.iter().map(|r| r.slot.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "p.Proc.process.data",
                "p.Proc.process#1.data",
                "p.Proc.process#2.data",
                "p.Proc.process.data#1",
            ]
        );
        assert_eq!(slots.len(), 4);
    }

    #[tokio::test]
    async fn test_every_overload_is_upgraded() {
        let mut proc = ClassEntity::new("Proc", "p.Proc", "p.py", "python", 1);
        proc.methods.push(repeated_method("process"));
        proc.methods.push(repeated_method("process"));
        let service = FakeService::new(&[
            ("p.Proc.process.data", "Payload", 0.9),
            ("p.Proc.process#1.data", "Payload", 0.9),
        ]);
        let enricher = TypeEnricher::new(Arc::new(service), settings());
        let mut classes = vec![proc];

        let report = enricher
            .enrich(&mut classes, &mut Vec::new(), &CancellationToken::new())
            .await;

        assert_eq!(report.requested, 2);
        assert_eq!(report.resolved, 2);
        for method in &classes[0].methods {
            assert_eq!(method.params[0].type_ref.as_str(), "Payload");
        }
    }

    #[tokio::test]
    async fn test_enrich_applies_confident_answers() {
        let service = FakeService::new(&[
            ("a.Foo.x", "Base", 0.9),
            ("a.Foo.run.ctx", "Context", 0.8),
            ("b.Bar.z", "Guess", 0.1),
        ]);
        let enricher = TypeEnricher::new(Arc::new(service), settings());
        let mut classes = sample_classes();
        let mut diagnostics = Vec::new();

        let report = enricher
            .enrich(&mut classes, &mut diagnostics, &CancellationToken::new())
            .await;

        assert_eq!(report.requested, 3);
        assert_eq!(report.resolved, 2);
        assert_eq!(report.failed_batches, 0);
        assert!(diagnostics.is_empty());
        assert_eq!(classes[0].field("x").unwrap().type_ref.as_str(), "Base");
        assert_eq!(classes[0].methods[0].params[0].type_ref.as_str(), "Context");
        assert!(classes[1].field("z").unwrap().type_ref.is_unknown());
        assert_eq!(classes[0].fields.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_batch_keeps_other_results() {
        let mut service = FakeService::new(&[("a.Foo.x", "Base", 0.9), ("b.Bar.z", "Zed", 0.9)]);
        service.fail_slots_containing = Some("b.Bar".to_string());
        let enricher = TypeEnricher::new(Arc::new(service), settings());
        let mut classes = sample_classes();
        let mut diagnostics = Vec::new();

        let report = enricher
            .enrich(&mut classes, &mut diagnostics, &CancellationToken::new())
            .await;

        assert_eq!(report.failed_batches, 1);
        assert_eq!(report.resolved, 1);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(classes[0].field("x").unwrap().type_ref.as_str(), "Base");
        assert!(classes[1].field("z").unwrap().type_ref.is_unknown());
    }

    #[tokio::test]
    async fn test_overall_timeout_leaves_unknown() {
        let mut service = FakeService::new(&[("a.Foo.x", "Base", 0.9)]);
        service.delay = Duration::from_secs(5);
        let settings = EnrichmentSettings {
            overall_timeout_secs: 0,
            ..settings()
        };
        let enricher = TypeEnricher::new(Arc::new(service), settings);
        let mut classes = sample_classes();
        let mut diagnostics = Vec::new();

        let report = enricher
            .enrich(&mut classes, &mut diagnostics, &CancellationToken::new())
            .await;

        assert!(report.timed_out);
        assert_eq!(report.resolved, 0);
        assert!(classes[0].field("x").unwrap().type_ref.is_unknown());
        assert_eq!(diagnostics.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let service = Arc::new(FakeService::new(&[("a.Foo.x", "Base", 0.9)]));
        let enricher = TypeEnricher::new(service.clone(), settings());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut classes = sample_classes();

        let report = enricher.enrich(&mut classes, &mut Vec::new(), &cancel).await;
        assert!(report.cancelled);
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
        assert!(classes[0].field("x").unwrap().type_ref.is_unknown());
    }

    #[tokio::test]
    async fn test_nothing_to_enrich() {
        let service = Arc::new(FakeService::new(&[]));
        let enricher = TypeEnricher::new(service.clone(), settings());
        let mut classes = vec![ClassEntity::new("A", "A", "a.py", "python", 1)];

        let report = enricher
            .enrich(&mut classes, &mut Vec::new(), &CancellationToken::new())
            .await;
        assert_eq!(report, EnrichmentReport::default());
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }
}
