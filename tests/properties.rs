//! Property-based tests for the sparse matrix layer and the spatial pooler.
//!
//! Run with: `cargo test --test properties`

use neocortex::prelude::*;
use proptest::prelude::*;

fn small_config(seed: i64, global: bool) -> HtmConfig {
    HtmConfig {
        input_dimensions: vec![48],
        column_dimensions: vec![64],
        potential_radius: 12,
        potential_pct: 0.6,
        global_inhibition: global,
        local_area_density: if global { -1.0 } else { 0.1 },
        num_active_columns_per_inh_area: if global { 6.0 } else { 0.0 },
        stimulus_threshold: 2.0,
        update_period: 5,
        cells_per_column: 2,
        random_gen_seed: seed,
        ..Default::default()
    }
}

fn dense_input(bits: &[usize], len: usize) -> Vec<u8> {
    let mut input = vec![0u8; len];
    for &b in bits {
        input[b % len] = 1;
    }
    input
}

// =============================================================================
// TOPOLOGY
// =============================================================================

mod topology {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_index_round_trip(
            dims in proptest::collection::vec(1u32..8, 1..4),
            column_major in any::<bool>()
        ) {
            let topology = ModuleTopology::new(&dims, column_major).unwrap();
            let n: usize = dims.iter().map(|&d| d as usize).product();
            prop_assert_eq!(topology.num_elements(), n);

            for index in 0..n {
                let coords = topology.coordinates_of(index).unwrap();
                prop_assert_eq!(coords.len(), dims.len());
                for (c, d) in coords.iter().zip(&dims) {
                    prop_assert!(c < d);
                }
                prop_assert_eq!(topology.index_of(&coords).unwrap(), index);
            }
        }

        #[test]
        fn prop_out_of_range_rejected(
            dims in proptest::collection::vec(1u32..8, 1..4),
            column_major in any::<bool>()
        ) {
            let topology = ModuleTopology::new(&dims, column_major).unwrap();
            prop_assert!(topology.coordinates_of(topology.num_elements()).is_err());
            let mut too_many = dims.clone();
            too_many.push(0);
            prop_assert!(topology.index_of(&too_many).is_err());
        }

        #[test]
        fn prop_neighborhood_contains_center(
            dims in proptest::collection::vec(1u32..8, 1..3),
            radius in 0u32..4,
            seed in any::<u64>()
        ) {
            let topology = ModuleTopology::new(&dims, false).unwrap();
            let center = (seed % topology.num_elements() as u64) as usize;
            let clipped = topology.neighborhood(center, radius).unwrap();
            let wrapped = topology.wrapping_neighborhood(center, radius).unwrap();
            prop_assert!(clipped.binary_search(&center).is_ok());
            prop_assert!(wrapped.binary_search(&center).is_ok());
            prop_assert!(clipped.len() <= wrapped.len());
        }
    }
}

// =============================================================================
// SPATIAL POOLER
// =============================================================================

mod spatial_pooler {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_pruned_synapses_stay_in_bounds(
            seed in 0i64..1000,
            global in any::<bool>(),
            inputs in proptest::collection::vec(
                proptest::collection::vec(0usize..48, 4..16), 1..12)
        ) {
            let mut mem = Connections::new(small_config(seed, global)).unwrap();
            let mut sp = SpatialPooler::new(&mut mem).unwrap();
            for bits in &inputs {
                sp.compute(&mut mem, &dense_input(bits, 48), true).unwrap();
            }

            let config = mem.config().clone();
            for c in 0..mem.num_columns() as ColumnIdx {
                let pool = mem.potential_pool(c).unwrap().len();
                let column = mem.column(c).unwrap();
                let synapses = mem.synapses_for_segment(column.proximal_segment);
                prop_assert!(synapses.len() <= pool);
                for &synapse in synapses {
                    let p = mem.data_for_synapse(synapse).permanence;
                    prop_assert!(p >= config.syn_perm_min && p <= config.syn_perm_max);
                }
            }
        }

        #[test]
        fn prop_fixed_seed_is_deterministic(
            seed in 0i64..1000,
            global in any::<bool>(),
            inputs in proptest::collection::vec(
                proptest::collection::vec(0usize..48, 4..16), 1..10)
        ) {
            let run = || {
                let mut mem = Connections::new(small_config(seed, global)).unwrap();
                let mut sp = SpatialPooler::new(&mut mem).unwrap();
                inputs
                    .iter()
                    .map(|bits| sp.compute(&mut mem, &dense_input(bits, 48), true).unwrap())
                    .collect::<Vec<_>>()
            };
            prop_assert_eq!(run(), run());
        }

        #[test]
        fn prop_active_columns_sorted_and_overlapping(
            seed in 0i64..1000,
            global in any::<bool>(),
            bits in proptest::collection::vec(0usize..48, 4..24)
        ) {
            let mut mem = Connections::new(small_config(seed, global)).unwrap();
            let mut sp = SpatialPooler::new(&mut mem).unwrap();
            let active = sp.compute(&mut mem, &dense_input(&bits, 48), false).unwrap();
            prop_assert!(active.windows(2).all(|w| w[0] < w[1]));
            for &c in &active {
                prop_assert!(mem.overlaps()[c as usize] > 0);
            }
        }
    }

    #[cfg(feature = "rayon")]
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn prop_parallel_init_matches_serial(seed in 0i64..1000, global in any::<bool>()) {
            let mut serial = Connections::new(small_config(seed, global)).unwrap();
            let mut parallel = Connections::new(small_config(seed, global)).unwrap();
            SpatialPooler::new(&mut serial).unwrap();
            SpatialPooler::new_parallel(&mut parallel).unwrap();
            prop_assert_eq!(serial, parallel);
        }
    }
}
