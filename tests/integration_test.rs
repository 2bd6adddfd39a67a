//! Integration tests for the zone pipeline.
//!
//! Tests cover:
//! - Enrichment → ATR → swings → zone through the CLI pipeline functions
//! - Worked scenarios: volatility spike, positioning change, swing low bounds
//! - Anchor selection by index and by timestamp
//! - Report-week windowing
//! - Provider failures and empty input
//! - Zone book and SQLite store upsert semantics

mod common;

use approx::assert_relative_eq;
use common::*;
use klzone::adapters::file_config_adapter::FileConfigAdapter;
use klzone::cli::{self, AnchorSelector, Settings, ZoneRequest};
use klzone::domain::enrich::enrich;
use klzone::domain::error::KlError;
use klzone::domain::indicator::atr::calc_atr;
use klzone::domain::positioning::{net_change, net_ratios, MacroWeighting};
use klzone::domain::swing::{find_swings, SwingKind};
use klzone::domain::zone::{compute_zone, place_zone, ZoneError, ZoneParams, ZoneType};
use klzone::domain::zone_book::{UpsertOutcome, ZoneBook};

fn settings(ini: &str) -> Settings {
    let config = FileConfigAdapter::from_string(ini).unwrap();
    cli::build_settings(&config, date(2024, 7, 15)).unwrap()
}

fn request(symbol: &str, anchor: AnchorSelector) -> ZoneRequest {
    ZoneRequest {
        symbol: symbol.to_string(),
        asset: "GOLD".to_string(),
        anchor,
        weighting: None,
        session: None,
        notes: String::new(),
    }
}

/// 14 flat bars at 100 with a 10-point spike in bar 10's high.
fn spike_bars() -> Vec<RawBar> {
    let mut bars = flat_raw_bars(14, 100.0);
    bars[10].high = Some(110.0);
    bars
}

const SPIKE_INI: &str = "[data]\nprice_dir = /unused\n[zone]\natr_period = 10\n";

mod worked_scenarios {
    use super::*;

    #[test]
    fn volatility_spike_without_positioning_uses_neutral_weight() {
        let prices = MockPriceData::new().with_bars("GC=F", spike_bars());
        let positioning = MockPositioning::new();
        let settings = settings(SPIKE_INI);

        let (zone, record) = cli::compute_zone_for(
            &prices,
            &positioning,
            &settings,
            &request("GC=F", AnchorSelector::Index(10)),
        )
        .unwrap();

        assert_relative_eq!(zone.atr_value, 1.0);
        assert_eq!(zone.macro_weight, None);
        assert_relative_eq!(zone.zone_size, 1.0 * 2.0 * 1.5);
        assert_eq!(zone.zone_type, ZoneType::General);
        assert_relative_eq!(zone.zone_high, 111.5);
        assert_relative_eq!(zone.zone_low, 98.5);

        assert_eq!(record.symbol, "GC=F");
        assert_eq!(record.cot_asset, "GOLD");
        assert_eq!(record.period, "weekly");
        assert_eq!(record.chart_interval, "1h");
        assert_eq!(record.anchor_index, 10);
    }

    #[test]
    fn positioning_change_widens_zone() {
        let prices = MockPriceData::new().with_bars("GC=F", spike_bars());
        let positioning = MockPositioning::new().with_records(
            "GOLD",
            vec![report(2024, 5, 28, 100, 50), report(2024, 6, 4, 80, 80)],
        );
        let settings = settings(SPIKE_INI);

        let (zone, _) = cli::compute_zone_for(
            &prices,
            &positioning,
            &settings,
            &request("GC=F", AnchorSelector::Index(10)),
        )
        .unwrap();

        let weight = zone.macro_weight.unwrap();
        assert_relative_eq!(weight, -1.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(zone.zone_size, 2.0 * (1.0 + 1.0 / 3.0), epsilon = 1e-12);
        assert_relative_eq!(zone.zone_high, 110.0 + zone.zone_size / 2.0);
    }

    #[test]
    fn positioning_ratio_sequence() {
        let records = vec![report(2024, 5, 28, 100, 50), report(2024, 6, 4, 80, 80)];
        let ratios = net_ratios(&records);
        assert_relative_eq!(ratios[0], 1.0 / 3.0);
        assert_eq!(ratios[1], 0.0);
        assert_relative_eq!(net_change(&records).unwrap(), -1.0 / 3.0);
    }

    #[test]
    fn swing_low_bounds() {
        let mut raw: Vec<RawBar> = (0..21)
            .map(|i| raw_bar(i, 100.0, 101.0, 99.0, 100.0, 1000.0))
            .collect();
        raw[10].high = Some(100.0);
        raw[10].low = Some(50.0);
        let bars = enrich(&raw);

        let swings = find_swings(&bars, 5);
        assert_eq!(swings.classify(10), Some(SwingKind::Low));

        let zone_type = ZoneType::from(swings.classify(10));
        assert_eq!(place_zone(&bars[10].bar, zone_type, 10.0), (55.0, 40.0));

        let params = ZoneParams {
            atr_period: 5,
            ..ZoneParams::default()
        };
        let zone = compute_zone(10, &bars, Some(0.0), &params).unwrap();
        // TRs over bars 6..=10: 2, 2, 2, 2, 50
        assert_relative_eq!(zone.atr_value, 11.6, epsilon = 1e-9);
        assert_relative_eq!(zone.zone_high, 50.0 + 11.6, epsilon = 1e-9);
        assert_relative_eq!(zone.zone_low, 50.0 - 23.2, epsilon = 1e-9);
    }

    #[test]
    fn empty_input_fails_with_out_of_range() {
        let bars = enrich(&[]);
        assert!(bars.is_empty());
        assert_eq!(
            compute_zone(0, &bars, None, &ZoneParams::default()),
            Err(ZoneError::AnchorOutOfRange { index: 0, len: 0 })
        );

        let prices = MockPriceData::new();
        let result = cli::compute_zone_for(
            &prices,
            &MockPositioning::new(),
            &settings(SPIKE_INI),
            &request("GC=F", AnchorSelector::Index(0)),
        );
        assert!(matches!(
            result,
            Err(KlError::Zone(ZoneError::AnchorOutOfRange { index: 0, len: 0 }))
        ));
    }
}

mod anchor_selection {
    use super::*;

    #[test]
    fn timestamp_in_chart_offset_selects_bar() {
        let prices = MockPriceData::new().with_bars("GC=F", spike_bars());
        // 13:00 at UTC+3 is hour 10 in UTC.
        let (zone, _) = cli::compute_zone_for(
            &prices,
            &MockPositioning::new(),
            &settings(SPIKE_INI),
            &request("GC=F", AnchorSelector::At("2024-06-03 13:00".into())),
        )
        .unwrap();
        assert_eq!(zone.anchor_index, 10);
        assert_eq!(zone.anchor_timestamp.offset().local_minus_utc(), 3 * 3600);
    }

    #[test]
    fn explicit_offset_timestamp_selects_bar() {
        let prices = MockPriceData::new().with_bars("GC=F", spike_bars());
        let (zone, _) = cli::compute_zone_for(
            &prices,
            &MockPositioning::new(),
            &settings(SPIKE_INI),
            &request("GC=F", AnchorSelector::At("2024-06-03T11:00:00+00:00".into())),
        )
        .unwrap();
        assert_eq!(zone.anchor_index, 11);
    }

    #[test]
    fn missing_candle_is_reported_not_substituted() {
        let prices = MockPriceData::new().with_bars("GC=F", spike_bars());
        let result = cli::compute_zone_for(
            &prices,
            &MockPositioning::new(),
            &settings(SPIKE_INI),
            &request("GC=F", AnchorSelector::At("2024-06-03 13:30".into())),
        );
        assert!(matches!(
            result,
            Err(KlError::Zone(ZoneError::AnchorNotFound { .. }))
        ));
    }

    #[test]
    fn unparsable_timestamp_is_anchor_not_found() {
        let prices = MockPriceData::new().with_bars("GC=F", spike_bars());
        let result = cli::compute_zone_for(
            &prices,
            &MockPositioning::new(),
            &settings(SPIKE_INI),
            &request("GC=F", AnchorSelector::At("yesterday".into())),
        );
        match result {
            Err(KlError::Zone(ZoneError::AnchorNotFound { timestamp })) => {
                assert_eq!(timestamp, "yesterday")
            }
            other => panic!("expected AnchorNotFound, got {other:?}"),
        }
    }

    #[test]
    fn anchor_in_atr_warmup_is_undefined() {
        let prices = MockPriceData::new().with_bars("GC=F", spike_bars());
        let result = cli::compute_zone_for(
            &prices,
            &MockPositioning::new(),
            &settings("[data]\nprice_dir = /unused\n"),
            &request("GC=F", AnchorSelector::Index(10)),
        );
        assert!(matches!(
            result,
            Err(KlError::Zone(ZoneError::AtrUndefined {
                index: 10,
                period: 14
            }))
        ));
    }
}

mod weighting {
    use super::*;

    fn three_reports() -> MockPositioning {
        MockPositioning::new().with_records(
            "GOLD",
            vec![
                report(2024, 5, 21, 100, 50),
                report(2024, 5, 28, 80, 80),
                report(2024, 6, 4, 100, 50),
            ],
        )
    }

    #[test]
    fn configured_aggregate_weighting() {
        let prices = MockPriceData::new().with_bars("GC=F", spike_bars());
        let settings = settings(
            "[data]\nprice_dir = /unused\n[zone]\natr_period = 10\nweighting = aggregate\n",
        );
        assert_eq!(settings.weighting, MacroWeighting::AggregateTurbulence);

        let (zone, _) = cli::compute_zone_for(
            &prices,
            &three_reports(),
            &settings,
            &request("GC=F", AnchorSelector::Index(10)),
        )
        .unwrap();
        assert_relative_eq!(zone.macro_weight.unwrap(), 2.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn request_override_beats_config() {
        let prices = MockPriceData::new().with_bars("GC=F", spike_bars());
        let settings = settings(
            "[data]\nprice_dir = /unused\n[zone]\natr_period = 10\nweighting = aggregate\n",
        );
        let mut req = request("GC=F", AnchorSelector::Index(10));
        req.weighting = Some(MacroWeighting::LatestChange);

        let (zone, _) =
            cli::compute_zone_for(&prices, &three_reports(), &settings, &req).unwrap();
        assert_relative_eq!(zone.macro_weight.unwrap(), 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn single_report_falls_back_to_neutral() {
        let positioning =
            MockPositioning::new().with_records("GOLD", vec![report(2024, 6, 4, 100, 50)]);
        let weight = cli::load_macro_weight(
            &positioning,
            &settings(SPIKE_INI),
            "GOLD",
            MacroWeighting::LatestChange,
        )
        .unwrap();
        assert_eq!(weight, None);
    }
}

mod series_loading {
    use super::*;

    #[test]
    fn provider_error_is_propagated() {
        let prices = MockPriceData::new().with_error("GC=F", "connection refused");
        let result = cli::load_series(&prices, &settings(SPIKE_INI), "GC=F");
        match result {
            Err(KlError::DataSource { reason }) => assert_eq!(reason, "connection refused"),
            other => panic!("expected DataSource error, got {other:?}"),
        }
    }

    #[test]
    fn configured_dates_trim_series() {
        let prices = MockPriceData::new().with_bars("GC=F", trending_raw_bars(72, 100.0));
        let settings = settings(
            "[data]\nprice_dir = /unused\nstart_date = 2024-06-04\nend_date = 2024-06-04\n",
        );
        let series = cli::load_series(&prices, &settings, "GC=F").unwrap();

        assert_eq!(series.len(), 24);
        assert!(series
            .visible()
            .iter()
            .all(|b| b.bar.timestamp.date_naive() == date(2024, 6, 4)));
        // The 21 bars of June 3rd (UTC+3) stay behind the window as history.
        assert_eq!(series.window.start, 21);
        assert_eq!(series.history.len(), 72);
    }

    #[test]
    fn report_week_keeps_previous_wednesday_to_tuesday() {
        // Two weeks of hourly bars; the last is Monday 2024-06-17 at UTC+3.
        let prices = MockPriceData::new().with_bars("GC=F", trending_raw_bars(24 * 14, 100.0));
        let settings = settings("[data]\nprice_dir = /unused\n[zone]\nreport_week = true\n");
        let series = cli::load_series(&prices, &settings, "GC=F").unwrap();
        let bars = series.visible();

        assert_eq!(bars.len(), 24 * 7);
        assert_eq!(bars[0].bar.timestamp.date_naive(), date(2024, 6, 5));
        assert_eq!(
            bars.last().unwrap().bar.timestamp.date_naive(),
            date(2024, 6, 11)
        );
    }

    #[test]
    fn report_week_anchor_uses_prior_history() {
        let prices = MockPriceData::new().with_bars("GC=F", trending_raw_bars(24 * 14, 100.0));
        let settings = settings("[data]\nprice_dir = /unused\n[zone]\nreport_week = true\n");

        for index in [0, 5, 12] {
            let (zone, record) = cli::compute_zone_for(
                &prices,
                &MockPositioning::new(),
                &settings,
                &request("GC=F", AnchorSelector::Index(index)),
            )
            .unwrap();
            assert_eq!(zone.anchor_index, index);
            assert_eq!(record.anchor_index, index);
            assert_relative_eq!(zone.atr_value, 2.0);
        }

        let (zone, _) = cli::compute_zone_for(
            &prices,
            &MockPositioning::new(),
            &settings,
            &request("GC=F", AnchorSelector::Index(0)),
        )
        .unwrap();
        assert_eq!(zone.anchor_timestamp.date_naive(), date(2024, 6, 5));
        // First bar of the week at 00:00 UTC+3 is hour 45 of the fixture.
        assert_relative_eq!(zone.anchor_price, 145.0);
    }

    #[test]
    fn report_week_anchor_past_window_is_out_of_range() {
        let prices = MockPriceData::new().with_bars("GC=F", trending_raw_bars(24 * 14, 100.0));
        let settings = settings("[data]\nprice_dir = /unused\n[zone]\nreport_week = true\n");
        let result = cli::compute_zone_for(
            &prices,
            &MockPositioning::new(),
            &settings,
            &request("GC=F", AnchorSelector::Index(24 * 7)),
        );
        match result {
            Err(KlError::Zone(ZoneError::AnchorOutOfRange { index, len })) => {
                assert_eq!(index, 24 * 7);
                assert_eq!(len, 24 * 7);
            }
            other => panic!("expected AnchorOutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn atr_spans_whole_series() {
        let bars = enriched(&trending_raw_bars(30, 100.0));
        let atr = calc_atr(&bars, 14);
        assert_eq!(atr.len(), bars.len());
        assert_eq!(atr.value_at(12), None);
        // Every TR after the first is max(2, |p+1-(p-1)|, ..) = 2.
        assert_relative_eq!(atr.value_at(29).unwrap(), 2.0);
    }
}

mod zone_collection {
    use super::*;

    #[test]
    fn book_deduplicates_by_anchor() {
        let prices = MockPriceData::new().with_bars("GC=F", spike_bars());
        let settings = settings(SPIKE_INI);
        let mut book = ZoneBook::new();

        let (_, first) = cli::compute_zone_for(
            &prices,
            &MockPositioning::new(),
            &settings,
            &request("GC=F", AnchorSelector::Index(10)),
        )
        .unwrap();
        assert_eq!(book.upsert(first), UpsertOutcome::Inserted);

        let mut again = request("GC=F", AnchorSelector::At("2024-06-03 13:00".into()));
        again.notes = "same candle".into();
        let (_, second) =
            cli::compute_zone_for(&prices, &MockPositioning::new(), &settings, &again).unwrap();
        assert_eq!(book.upsert(second), UpsertOutcome::Updated);

        let (_, third) = cli::compute_zone_for(
            &prices,
            &MockPositioning::new(),
            &settings,
            &request("GC=F", AnchorSelector::Index(12)),
        )
        .unwrap();
        assert_eq!(book.upsert(third), UpsertOutcome::Inserted);

        assert_eq!(book.len(), 2);
        let zones = book.for_symbol("GC=F", "weekly");
        assert_eq!(zones[0].anchor_index, 12);
        assert_eq!(zones[1].notes, "same candle");
    }

    #[test]
    fn computation_is_deterministic() {
        let prices = MockPriceData::new().with_bars("GC=F", spike_bars());
        let settings = settings(SPIKE_INI);
        let req = request("GC=F", AnchorSelector::Index(11));
        let a = cli::compute_zone_for(&prices, &MockPositioning::new(), &settings, &req).unwrap();
        let b = cli::compute_zone_for(&prices, &MockPositioning::new(), &settings, &req).unwrap();
        assert_eq!(a, b);
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn sqlite_store_round_trip() {
        use klzone::adapters::sqlite_adapter::SqliteZoneStore;
        use klzone::ports::zone_store_port::ZoneStore;

        let store = SqliteZoneStore::in_memory().unwrap();
        store.initialize_schema().unwrap();

        let prices = MockPriceData::new().with_bars("GC=F", spike_bars());
        let mut req = request("GC=F", AnchorSelector::Index(10));
        req.session = Some("session-1".into());
        let (_, record) =
            cli::compute_zone_for(&prices, &MockPositioning::new(), &settings(SPIKE_INI), &req)
                .unwrap();

        assert_eq!(store.upsert(&record).unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(&record).unwrap(), UpsertOutcome::Updated);

        let stored = store.zones_for_symbol("GC=F", "weekly").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].record, record);

        let stats = store.stats("GC=F", "weekly").unwrap();
        assert_eq!(stats.total_zones, 1);
        assert_eq!(stats.general_count, 1);
        assert_eq!(stats.avg_macro_weight, None);

        assert_eq!(store.delete_session("session-1").unwrap(), 1);
        assert!(store.zones_for_symbol("GC=F", "weekly").unwrap().is_empty());
    }
}
