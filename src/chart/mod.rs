//! Chart projection: per-symbol bars → series aligned on one date axis.

use crate::models::Bar;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub symbol: String,
    /// Closing prices, one per axis date. `None` marks a gap, never a zero.
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    pub date_axis: Vec<NaiveDate>,
    pub series: Vec<Series>,
}

/// Build aligned close-price series. The axis is the sorted union of every
/// symbol's bar dates; series come out in symbol order.
pub fn project(per_symbol: &BTreeMap<String, Vec<Bar>>) -> Projection {
    let date_axis: Vec<NaiveDate> = per_symbol
        .values()
        .flat_map(|bars| bars.iter().map(|b| b.date))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let series = per_symbol
        .iter()
        .map(|(symbol, bars)| {
            let by_date: HashMap<NaiveDate, f64> = bars.iter().map(|b| (b.date, b.close)).collect();
            Series {
                symbol: symbol.clone(),
                values: date_axis.iter().map(|d| by_date.get(d).copied()).collect(),
            }
        })
        .collect();

    Projection { date_axis, series }
}

/// Label every `step`-th point so at most about `budget` labels are drawn.
pub fn label_step(len: usize, budget: usize) -> usize {
    if budget == 0 || len <= budget {
        1
    } else {
        len.div_ceil(budget)
    }
}

/// One label per axis point; points between steps get an empty string and the
/// last point is always labelled.
pub fn axis_labels(axis: &[NaiveDate], budget: usize) -> Vec<String> {
    let step = label_step(axis.len(), budget);
    let last = axis.len().saturating_sub(1);
    axis.iter()
        .enumerate()
        .map(|(i, d)| {
            if i % step == 0 || i == last {
                d.format("%m/%d").to_string()
            } else {
                String::new()
            }
        })
        .collect()
}

/// Latest-session volume per symbol, for the volume bar chart.
pub fn latest_volumes(per_symbol: &BTreeMap<String, Vec<Bar>>) -> Vec<(String, i64)> {
    per_symbol
        .iter()
        .filter_map(|(symbol, bars)| {
            bars.iter()
                .max_by_key(|b| b.date)
                .map(|b| (symbol.clone(), b.volume))
        })
        .collect()
}
