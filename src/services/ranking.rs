use crate::services::kraken::PairListing;
use std::collections::HashMap;
use tracing::debug;

/// One ranked pair; exists only while a snapshot run is in flight
#[derive(Debug, Clone, PartialEq)]
pub struct PairVolume {
    pub name: String,
    pub volume: f64,
}

/// Rank pairs by 24h volume, descending, and keep the top `n`.
///
/// Entries without a parseable decimal volume are dropped silently: a
/// malformed pair never aborts ranking. Equal volumes tie-break on the
/// pair name, ascending, so the ordering is deterministic regardless of
/// map iteration order.
pub fn select_top(listings: &HashMap<String, PairListing>, n: usize) -> Vec<PairVolume> {
    let mut ranked: Vec<PairVolume> = listings
        .values()
        .filter_map(|listing| {
            let raw = listing.volume_24h.as_deref()?;
            match raw.parse::<f64>() {
                Ok(volume) => Some(PairVolume {
                    name: listing.name.clone(),
                    volume,
                }),
                Err(_) => {
                    debug!(pair = %listing.name, volume = %raw, "Dropping pair with unparseable volume");
                    None
                }
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.volume
            .total_cmp(&a.volume)
            .then_with(|| a.name.cmp(&b.name))
    });
    ranked.truncate(n);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(name: &str, volume: Option<&str>) -> (String, PairListing) {
        (
            name.to_string(),
            PairListing {
                name: name.to_string(),
                base: Some(format!("{}_BASE", name)),
                quote: Some("ZUSD".to_string()),
                volume_24h: volume.map(str::to_string),
            },
        )
    }

    #[test]
    fn test_sorts_descending_by_volume() {
        let listings: HashMap<_, _> = [
            listing("ETHUSD", Some("200.0")),
            listing("XBTUSD", Some("300.5")),
            listing("SOLUSD", Some("100.25")),
        ]
        .into_iter()
        .collect();

        let top = select_top(&listings, 10);
        let names: Vec<&str> = top.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["XBTUSD", "ETHUSD", "SOLUSD"]);
        assert!(top.windows(2).all(|w| w[0].volume >= w[1].volume));
    }

    #[test]
    fn test_truncates_to_n() {
        let listings: HashMap<_, _> = (0..25)
            .map(|i| listing(&format!("PAIR{:02}", i), Some(&format!("{}.0", i))))
            .collect();
        assert_eq!(select_top(&listings, 10).len(), 10);
        assert_eq!(select_top(&listings, 0).len(), 0);
    }

    #[test]
    fn test_drops_missing_and_unparseable_volumes() {
        let listings: HashMap<_, _> = [
            listing("XBTUSD", Some("123.45")),
            listing("BADPAIR", None),
            listing("WORSTPAIR", Some("volume?")),
        ]
        .into_iter()
        .collect();

        let top = select_top(&listings, 10);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].name, "XBTUSD");
        assert_eq!(top[0].volume, 123.45);
    }

    #[test]
    fn test_equal_volumes_tie_break_on_name() {
        let listings: HashMap<_, _> = [
            listing("BBBUSD", Some("50.0")),
            listing("AAAUSD", Some("50.0")),
            listing("CCCUSD", Some("50.0")),
        ]
        .into_iter()
        .collect();

        let names: Vec<String> = select_top(&listings, 10).into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["AAAUSD", "BBBUSD", "CCCUSD"]);
    }

    #[test]
    fn test_empty_input_yields_empty_selection() {
        assert!(select_top(&HashMap::new(), 10).is_empty());
    }

    #[test]
    fn test_fewer_survivors_than_n() {
        let listings: HashMap<_, _> = [listing("XBTUSD", Some("1.0"))].into_iter().collect();
        assert_eq!(select_top(&listings, 10).len(), 1);
    }
}
