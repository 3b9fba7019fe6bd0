use std::collections::HashMap;

use tracing::info;

use crate::channels::{RankedSource, SelectedChannel, ValidatedSource};

/// Groups validated sources by channel, ranks each group by latency and
/// keeps the `best_count` fastest. Equal latencies keep discovery order.
/// Channels come out in order of their first discovered source.
pub fn select_best(sources: &[ValidatedSource], best_count: usize) -> Vec<SelectedChannel> {
    let mut ordered: Vec<&ValidatedSource> = sources.iter().collect();
    ordered.sort_by_key(|s| s.discovery);

    let mut groups: Vec<(&str, Vec<&ValidatedSource>)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for source in ordered {
        match index.get(source.name.as_str()) {
            Some(&i) => groups[i].1.push(source),
            None => {
                index.insert(source.name.as_str(), groups.len());
                groups.push((source.name.as_str(), vec![source]));
            }
        }
    }

    let selected: Vec<SelectedChannel> = groups
        .into_iter()
        .map(|(name, mut group)| {
            group.sort_by_key(|s| (s.latency, s.discovery));
            SelectedChannel {
                name: name.to_string(),
                sources: group
                    .into_iter()
                    .take(best_count)
                    .map(RankedSource::from_validated)
                    .collect(),
            }
        })
        .collect();

    info!(
        "Kept {} channels with up to {} sources each",
        selected.len(),
        best_count
    );
    selected
}
