//! End-to-end tests for the flu model.
//!
//! These drive the whole engine surface the way a display layer would:
//! parametrize, start, tick, and read logs back out.

use approx::assert_relative_eq;
use sysdyn_core::model::SystemModel;
use sysdyn_models::FluModel;

/// Run the model for its configured duration, logging the named equations
/// from the first tick.
fn run_logged(
    model: &mut FluModel,
    names: &[&str],
) -> std::collections::HashMap<String, Vec<f64>> {
    model.parametrize();
    model.simulator_mut().start(1.0).unwrap();
    model.simulator_mut().log(names).unwrap();
    while !model.simulation_ended() {
        model.simulator_mut().tick();
    }
    model.simulator().get_logs(names).unwrap()
}

mod conservation {
    use super::*;

    #[test]
    fn population_is_conserved_at_every_tick() {
        let mut model = FluModel::new();
        model.parametrize();
        model.simulator_mut().start(1.0).unwrap();

        let initial_total: f64 = [
            model.susceptible(),
            model.infected(),
            model.sick(),
            model.recovered(),
            model.dead(),
        ]
        .iter()
        .map(|&id| model.simulator().values().k(id))
        .sum();
        assert_relative_eq!(initial_total, 1_000_100.0);

        while !model.simulation_ended() {
            model.simulator_mut().tick();
            let total: f64 = [
                model.susceptible(),
                model.infected(),
                model.sick(),
                model.recovered(),
                model.dead(),
            ]
            .iter()
            .map(|&id| model.simulator().values().k(id))
            .sum();
            // Every flow enters one stock and leaves another, so the total is
            // exact up to floating point accumulation.
            assert_relative_eq!(total, initial_total, max_relative = 1e-9);
        }
    }

    #[test]
    fn deaths_accumulate_monotonically() {
        let mut model = FluModel::new();
        let logs = run_logged(&mut model, &["dead"]);
        let dead = &logs["dead"];

        for window in dead.windows(2) {
            assert!(window[1] >= window[0] - 1e-9, "deaths cannot un-happen");
        }
        assert!(
            *dead.last().unwrap() > 0.0,
            "a lethal epidemic must produce deaths"
        );
    }
}

mod dynamics {
    use super::*;

    fn peak(samples: &[f64]) -> (usize, f64) {
        samples
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::MIN), |best, (index, value)| {
                if value > best.1 {
                    (index, value)
                } else {
                    best
                }
            })
    }

    #[test]
    fn an_outbreak_rises_and_subsides() {
        let mut model = FluModel::new();
        let logs = run_logged(&mut model, &["sick", "susceptible"]);
        let sick = &logs["sick"];
        let susceptible = &logs["susceptible"];

        let (peak_day, peak_sick) = peak(sick);
        assert!(
            peak_sick > 1_000.0,
            "the outbreak never took off: peak sick {}",
            peak_sick
        );
        assert!(
            peak_day < sick.len() - 1,
            "the outbreak must peak before the run ends"
        );
        assert!(
            *sick.last().unwrap() < peak_sick / 2.0,
            "sick population should subside after the peak"
        );
        assert!(
            *susceptible.last().unwrap() < susceptible[0],
            "an outbreak depletes the susceptible pool"
        );
    }

    #[test]
    fn higher_infection_rate_gives_a_larger_earlier_peak() {
        let mut baseline = FluModel::new();
        let baseline_logs = run_logged(&mut baseline, &["sick"]);
        let (baseline_day, baseline_peak) = peak(&baseline_logs["sick"]);

        let mut contagious = FluModel::new();
        contagious
            .simulator_mut()
            .parameters_mut()
            .from_name_mut("Infection Rate")
            .unwrap()
            .set_edited_value(0.1);
        contagious.simulator_mut().parameters_mut().commit_edits();
        let contagious_logs = run_logged(&mut contagious, &["sick"]);
        let (contagious_day, contagious_peak) = peak(&contagious_logs["sick"]);

        assert!(
            contagious_peak > baseline_peak,
            "doubling the infection rate should raise the peak: {} vs {}",
            contagious_peak,
            baseline_peak
        );
        assert!(
            contagious_day <= baseline_day,
            "doubling the infection rate should not delay the peak: {} vs {}",
            contagious_day,
            baseline_day
        );
    }

    #[test]
    fn zero_lethality_means_nobody_dies() {
        let mut model = FluModel::new();
        model
            .simulator_mut()
            .parameters_mut()
            .from_name_mut("Lethality Rate")
            .unwrap()
            .set_edited_value(0.0);
        model.simulator_mut().parameters_mut().commit_edits();

        let logs = run_logged(&mut model, &["dead", "sick"]);
        assert!(logs["dead"].iter().all(|&d| d.abs() < 1e-9));
        // The epidemic itself still happens.
        assert!(logs["sick"].iter().any(|&s| s > 1_000.0));
    }

    #[test]
    fn log_length_matches_the_tick_count() {
        let mut model = FluModel::new();
        let logs = run_logged(&mut model, &["sick"]);
        assert_eq!(logs["sick"].len() as u64, model.simulator().tick_count());
    }
}
