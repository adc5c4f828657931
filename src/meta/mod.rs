//! Schema and Campaign Metadata
//!
//! SQLite database describing the analytics attributes and the campaign
//! conditions:
//!
//! - **store**: table layout, open/create, loading the runtime structures
//! - **generate**: the standard attribute set plus random campaigns

mod error;
mod generate;
mod store;

pub use error::{MetaError, MetaResult};
pub use generate::PIVOT_ATTRIBUTES;
pub use store::{decode_metric, encode_metric, MetaStore, MetaSummary};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::Conjunct;
    use crate::schema::{
        AggrFun, AnalyticsSchema, Event, FilterType, Metric, RecordView, WindowLength,
    };
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use tempfile::TempDir;

    fn generated(campaigns: usize) -> (TempDir, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("meta").join("aim.db");
        let mut store = MetaStore::create(&path).unwrap();
        store.populate_standard(11, campaigns).unwrap();
        (dir, path)
    }

    #[test]
    fn test_metric_ids() {
        for id in 1..=9 {
            let (metric, filter) = decode_metric(id).unwrap();
            assert_eq!(encode_metric(metric, filter), id);
        }
        assert_eq!(decode_metric(1), Some((Metric::Cost, FilterType::No)));
        assert_eq!(decode_metric(5), Some((Metric::Call, FilterType::Local)));
        assert_eq!(decode_metric(9), Some((Metric::Dur, FilterType::NonLocal)));
        assert_eq!(decode_metric(0), None);
        assert_eq!(decode_metric(10), None);
    }

    #[test]
    fn test_generated_summary() {
        let (_dir, path) = generated(25);
        let store = MetaStore::open(&path).unwrap();
        let summary = store.summary().unwrap();
        assert_eq!(summary.metrics, 9);
        assert_eq!(summary.attributes, 42);
        assert_eq!(summary.pivot_attributes, PIVOT_ATTRIBUTES as usize);
        assert_eq!(summary.campaigns, 25);
        assert!(summary.conjuncts >= 25 && summary.conjuncts <= 125);
        assert!(summary.predicates > 0);
    }

    #[test]
    fn test_loaded_schema_is_standard() {
        let (_dir, path) = generated(1);
        let schema = MetaStore::open(&path).unwrap().load_schema().unwrap();
        let standard = AnalyticsSchema::standard();

        assert_eq!(schema.len(), standard.len());
        assert_eq!(schema.total_size(), standard.total_size());
        for (a, b) in schema.entries().iter().zip(standard.entries()) {
            assert_eq!(a.name(), b.name());
            assert_eq!(a.offset, b.offset);
        }
        assert!(schema
            .offset_of(Metric::Call, AggrFun::Sum, FilterType::Local, WindowLength::Week)
            .is_some());
    }

    #[test]
    fn test_campaigns_span_january_2012() {
        let (_dir, path) = generated(40);
        let store = MetaStore::open(&path).unwrap();
        let schema = store.load_schema().unwrap();
        let index = store.load_campaign_index(&schema).unwrap();

        let jan_1 = 1_325_376_000_000i64;
        let feb_1 = jan_1 + 31 * crate::schema::MSECS_PER_DAY;
        assert_eq!(index.num_campaigns(), 40);
        for (i, campaign) in index.campaigns().iter().enumerate() {
            assert_eq!(campaign.id, i as u32);
            assert!(campaign.valid_from >= jan_1);
            assert!(campaign.valid_to <= feb_1);
            let days = (campaign.valid_to - campaign.valid_from) / crate::schema::MSECS_PER_DAY;
            assert!((7..=31).contains(&days));
        }
    }

    #[test]
    fn test_loaded_index_matches_brute_force() {
        let (_dir, path) = generated(60);
        let store = MetaStore::open(&path).unwrap();
        let schema = store.load_schema().unwrap();
        let index = store.load_campaign_index(&schema).unwrap();
        let conjuncts: Vec<Conjunct> = store.load_conjuncts(&schema).unwrap();
        assert!(index.num_entry_indexes() > 0);
        assert!(index.num_entry_indexes() <= PIVOT_ATTRIBUTES as usize);

        let mut rng = StdRng::seed_from_u64(3);
        let mut record = schema.default_record(0);
        for i in 0..400 {
            let event = Event::new(1, i * 3_600_000)
                .call(rng.gen_range(1..40), rng.gen_range(0.5..30.0))
                .long_distance(rng.gen_bool(0.3));
            record = schema.update_record(&record, &event);

            let view = RecordView::new(&record);
            let mut expected: Vec<u32> = conjuncts
                .iter()
                .filter(|c| c.evaluate(&view))
                .map(|c| c.campaign_id())
                .collect();
            expected.sort_unstable();
            expected.dedup();

            let matched: Vec<u32> = index.match_campaigns(&record).iter().collect();
            assert_eq!(matched, expected, "event {}", i);
        }
    }

    #[test]
    fn test_same_seed_same_campaigns() {
        let (_a, first) = generated(10);
        let (_b, second) = generated(10);
        let load = |path: &std::path::Path| {
            let store = MetaStore::open(path).unwrap();
            let schema = store.load_schema().unwrap();
            store.load_conjuncts(&schema).unwrap().len()
        };
        assert_eq!(load(&first), load(&second));
        assert_eq!(
            MetaStore::open(&first).unwrap().summary().unwrap(),
            MetaStore::open(&second).unwrap().summary().unwrap()
        );
    }

    #[test]
    fn test_empty_store_loads_empty_index() {
        let store = MetaStore::in_memory().unwrap();
        assert!(store.path().is_none());
        let schema = AnalyticsSchema::standard();
        let index = store.load_campaign_index(&schema).unwrap();
        assert_eq!(index.num_campaigns(), 0);
        assert!(index.match_campaigns(&schema.default_record(0)).is_empty());
    }

    #[test]
    fn test_rejects_unknown_window_size() {
        let mut store = MetaStore::in_memory().unwrap();
        store.populate_standard(1, 0).unwrap();
        store
            .conn
            .execute("UPDATE wt_attribute SET window_size = 'm' WHERE id = 3", [])
            .unwrap();
        assert!(matches!(store.load_schema(), Err(MetaError::Invalid(_))));
    }

    #[test]
    fn test_populate_twice_fails() {
        let mut store = MetaStore::in_memory().unwrap();
        store.populate_standard(1, 2).unwrap();
        assert!(matches!(
            store.populate_standard(1, 2),
            Err(MetaError::Sqlite(_))
        ));
    }

    #[test]
    fn test_open_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        assert!(MetaStore::open(&dir.path().join("missing.db")).is_err());
    }
}
