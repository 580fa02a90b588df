// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of Flatland — Licensed under AGPL-3.0-or-later.

//! Type-erased scalar-metric registry.
//!
//! Lets telemetry consumers evaluate every score attached to a result type
//! without depending on the concrete struct. The flatness scores register
//! themselves through [`register_flatness_metrics`].

use crate::flatness::FlatnessScores;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

type RegistryMap = HashMap<TypeId, Vec<Arc<dyn MetricComputation>>>;

static REGISTRY: OnceLock<RwLock<RegistryMap>> = OnceLock::new();

/// Unit metadata associated with a registered metric.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricUnit {
    /// Unitless scalar quantity.
    Unitless,
    /// Dimensionless ratio, ideally close to 1.
    Ratio,
    /// Latent-space distance.
    Distance,
}

/// Descriptor that summarises a registered metric.
#[derive(Clone, Debug)]
pub struct MetricDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub unit: MetricUnit,
    pub higher_is_better: Option<bool>,
}

trait MetricComputation: Send + Sync {
    fn descriptor(&self) -> &MetricDescriptor;
    fn evaluate_any(&self, input: &dyn Any) -> Option<f64>;
}

struct FnMetric<T, F>
where
    T: Any + Send + Sync + 'static,
    F: Fn(&T) -> Option<f64> + Send + Sync + 'static,
{
    descriptor: MetricDescriptor,
    evaluator: F,
    _marker: std::marker::PhantomData<T>,
}

impl<T, F> MetricComputation for FnMetric<T, F>
where
    T: Any + Send + Sync + 'static,
    F: Fn(&T) -> Option<f64> + Send + Sync + 'static,
{
    fn descriptor(&self) -> &MetricDescriptor {
        &self.descriptor
    }

    fn evaluate_any(&self, input: &dyn Any) -> Option<f64> {
        input
            .downcast_ref::<T>()
            .and_then(|value| (self.evaluator)(value))
    }
}

fn registry() -> &'static RwLock<RegistryMap> {
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

fn insert_metric(type_id: TypeId, metric: Arc<dyn MetricComputation>) {
    let mut guard = registry()
        .write()
        .expect("metric registry poisoned while registering metric");
    let entry = guard.entry(type_id).or_default();
    if entry
        .iter()
        .any(|existing| existing.descriptor().name == metric.descriptor().name)
    {
        return;
    }
    entry.push(metric);
}

/// Registers a new scalar metric evaluator for the provided type `T`.
pub fn register_metric<T, F>(descriptor: MetricDescriptor, evaluator: F)
where
    T: Any + Send + Sync + 'static,
    F: Fn(&T) -> Option<f64> + Send + Sync + 'static,
{
    let type_id = TypeId::of::<T>();
    let metric: Arc<dyn MetricComputation> = Arc::new(FnMetric::<T, F> {
        descriptor,
        evaluator,
        _marker: std::marker::PhantomData,
    });
    insert_metric(type_id, metric);
}

/// Evaluates all registered metrics that match the provided value type.
pub fn evaluate<T>(value: &T) -> Vec<(MetricDescriptor, f64)>
where
    T: Any + Send + Sync + 'static,
{
    let guard = registry()
        .read()
        .expect("metric registry poisoned while evaluating metrics");
    guard
        .get(&TypeId::of::<T>())
        .into_iter()
        .flat_map(|metrics| {
            metrics.iter().filter_map(|metric| {
                metric
                    .evaluate_any(value)
                    .map(|v| (metric.descriptor().clone(), v))
            })
        })
        .collect()
}

/// Returns the descriptors registered for the provided type without evaluating them.
pub fn descriptors_for<T>() -> Vec<MetricDescriptor>
where
    T: Any + Send + Sync + 'static,
{
    let guard = registry()
        .read()
        .expect("metric registry poisoned while enumerating descriptors");
    guard
        .get(&TypeId::of::<T>())
        .map(|metrics| {
            metrics
                .iter()
                .map(|metric| metric.descriptor().clone())
                .collect()
        })
        .unwrap_or_default()
}

/// Registers the seven flatness scores. Idempotent.
pub fn register_flatness_metrics() {
    let entries: [(&'static str, &'static str, MetricUnit, fn(&FlatnessScores) -> f64); 7] = [
        (
            "flatness.ave_flatness",
            "Blended flatness: l2 width over l1 estimated length",
            MetricUnit::Ratio,
            |s| s.ave_flatness,
        ),
        (
            "flatness.ave_flatness_l1",
            "Manhattan flatness ratio",
            MetricUnit::Ratio,
            |s| s.ave_flatness_l1,
        ),
        (
            "flatness.ave_flatness_l2",
            "Euclidean flatness ratio",
            MetricUnit::Ratio,
            |s| s.ave_flatness_l2,
        ),
        (
            "flatness.ave_width_l1",
            "Mean l1 traversal diameter across active factors",
            MetricUnit::Distance,
            |s| s.ave_width_l1,
        ),
        (
            "flatness.ave_width_l2",
            "Mean l2 traversal diameter across active factors",
            MetricUnit::Distance,
            |s| s.ave_width_l2,
        ),
        (
            "flatness.ave_length_l1",
            "Mean estimated l1 path length across active factors",
            MetricUnit::Distance,
            |s| s.ave_length_l1,
        ),
        (
            "flatness.ave_length_l2",
            "Mean estimated l2 path length across active factors",
            MetricUnit::Distance,
            |s| s.ave_length_l2,
        ),
    ];
    for (name, description, unit, getter) in entries {
        let higher_is_better = matches!(unit, MetricUnit::Ratio).then_some(true);
        register_metric::<FlatnessScores, _>(
            MetricDescriptor {
                name,
                description,
                unit,
                higher_is_better,
            },
            move |scores| Some(getter(scores)),
        );
    }
}

#[cfg(test)]
pub(crate) fn clear_for_tests() {
    if let Some(lock) = REGISTRY.get() {
        lock.write()
            .expect("metric registry poisoned while clearing")
            .clear();
    }
}
