use crate::models::WatchItem;
use std::cmp::Ordering;

pub const RANK_LIMIT: usize = 5;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ranking {
    pub gainers: Vec<WatchItem>,
    pub losers: Vec<WatchItem>,
}

/// Top gainers (change ≥ 0, descending) and losers (change < 0, ascending).
/// Equal changes are ordered by symbol. Items without a usable change are skipped.
pub fn rank(items: &[WatchItem]) -> Ranking {
    let with_change: Vec<(&WatchItem, f64)> = items
        .iter()
        .filter_map(|i| i.change_pct.filter(|c| !c.is_nan()).map(|c| (i, c)))
        .collect();

    let mut gainers: Vec<(&WatchItem, f64)> =
        with_change.iter().copied().filter(|(_, c)| *c >= 0.0).collect();
    gainers.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| by_symbol(a.0, b.0)));

    let mut losers: Vec<(&WatchItem, f64)> =
        with_change.iter().copied().filter(|(_, c)| *c < 0.0).collect();
    losers.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| by_symbol(a.0, b.0)));

    Ranking {
        gainers: gainers.into_iter().take(RANK_LIMIT).map(|(i, _)| i.clone()).collect(),
        losers: losers.into_iter().take(RANK_LIMIT).map(|(i, _)| i.clone()).collect(),
    }
}

fn by_symbol(a: &WatchItem, b: &WatchItem) -> Ordering {
    a.symbol.cmp(&b.symbol)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(symbol: &str, change: Option<f64>) -> WatchItem {
        WatchItem {
            change_pct: change,
            ..WatchItem::new(symbol, symbol)
        }
    }

    fn symbols(items: &[WatchItem]) -> Vec<&str> {
        items.iter().map(|i| i.symbol.as_str()).collect()
    }

    #[test]
    fn splits_and_orders() {
        let items = vec![
            item("A", Some(1.0)),
            item("B", Some(-2.0)),
            item("C", Some(0.0)),
            item("D", Some(3.5)),
            item("E", Some(-0.5)),
            item("F", None),
            item("G", Some(f64::NAN)),
        ];
        let r = rank(&items);
        assert_eq!(symbols(&r.gainers), vec!["D", "A", "C"]);
        assert_eq!(symbols(&r.losers), vec!["B", "E"]);
    }

    #[test]
    fn caps_at_five_each() {
        let items: Vec<WatchItem> = (0..8)
            .flat_map(|n| {
                vec![
                    item(&format!("UP{}", n), Some(n as f64)),
                    item(&format!("DN{}", n), Some(-(n as f64) - 1.0)),
                ]
            })
            .collect();
        let r = rank(&items);
        assert_eq!(r.gainers.len(), RANK_LIMIT);
        assert_eq!(r.losers.len(), RANK_LIMIT);
        assert!(r.gainers.iter().all(|i| i.change_pct.unwrap() >= 0.0));
        assert!(r.losers.iter().all(|i| i.change_pct.unwrap() < 0.0));
        assert_eq!(r.gainers[0].symbol, "UP7");
        assert_eq!(r.losers[0].symbol, "DN7");
    }

    #[test]
    fn ties_break_on_symbol() {
        let items = vec![
            item("MSFT", Some(1.0)),
            item("AAPL", Some(1.0)),
            item("ZM", Some(-1.0)),
            item("IBM", Some(-1.0)),
        ];
        let r = rank(&items);
        assert_eq!(symbols(&r.gainers), vec!["AAPL", "MSFT"]);
        assert_eq!(symbols(&r.losers), vec!["IBM", "ZM"]);
    }

    #[test]
    fn empty_input() {
        assert_eq!(rank(&[]), Ranking::default());
    }
}
