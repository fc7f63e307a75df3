//! Offline evolution of the scoring network's weights. A population of
//! flat weight vectors is evolved generation by generation; the fitness of
//! a vector is the mean beam-search objective it reaches over a bank of
//! training instances.

use rand::seq::SliceRandom;
use rand::Rng;
use rand::RngExt;
use rayon::prelude::*;
use std::time::Instant;

use crate::instance::Instance;
use crate::nnet::Mlp;
use crate::search::{BeamSearch, FeatureConfig};

/// How offspring are produced from the current population.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GaVariant {
    /// Two parents drawn uniformly from the whole population, mixed 50/50.
    Rkga,
    /// One elite and one non-elite parent; each weight comes from the
    /// elite with the configured inheritance probability.
    Brkga,
    /// Parents picked by lexicase selection over the training instances,
    /// then mixed 50/50.
    Lexicase,
}

impl GaVariant {
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            1 => Some(GaVariant::Rkga),
            2 => Some(GaVariant::Brkga),
            3 => Some(GaVariant::Lexicase),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TrainerConfig {
    pub population_size: usize,
    pub n_elites: usize,
    pub n_mutants: usize,
    pub elite_inheritance_probability: f64,
    /// Half-range of the uniform weight initialisation.
    pub weight_limit: f64,
    /// Training wall clock in seconds.
    pub time_limit: f64,
    /// Time limit of each fitness beam search, in seconds.
    pub bs_time_limit: f64,
    /// Beam width of each fitness beam search.
    pub beam_width: usize,
    pub ga: GaVariant,
    pub parallel: bool,
    /// Optional generation cap on top of the wall clock, for reproducible
    /// runs.
    pub max_generations: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct Individual {
    pub weights: Vec<f64>,
    pub fitness: f64,
}

/// A new incumbent: the best weight vector seen so far, with its training
/// fitness and its mean objective over the validation instances.
pub struct Incumbent<'a> {
    pub elapsed: f64,
    pub generation: usize,
    pub fitness: f64,
    pub validation_value: f64,
    pub weights: &'a [f64],
}

/// Receives every incumbent improvement. The binary persists weights and
/// appends to the value logs; tests record the events.
pub trait TrainingObserver {
    fn incumbent(&mut self, event: &Incumbent);
}

impl TrainingObserver for () {
    fn incumbent(&mut self, _: &Incumbent) {}
}

pub struct Trainer<'a> {
    config: TrainerConfig,
    net: Mlp,
    feature_config: FeatureConfig,
    training: &'a [Instance],
    validation: &'a [Instance],
}

impl<'a> Trainer<'a> {
    pub fn new(
        config: TrainerConfig,
        net: Mlp,
        feature_config: FeatureConfig,
        training: &'a [Instance],
        validation: &'a [Instance],
    ) -> Self {
        debug_assert!(config.n_elites + config.n_mutants <= config.population_size);
        Trainer {
            config,
            net,
            feature_config,
            training,
            validation,
        }
    }

    /// Evolves until the wall clock (or the generation cap) is exhausted
    /// and returns the best weight vector found.
    ///
    /// Selection and crossover draw from `rng` on the calling thread only,
    /// so a seeded generator with `parallel` off reproduces a run exactly.
    pub fn train<R: Rng>(
        &mut self,
        rng: &mut R,
        observer: &mut dyn TrainingObserver,
    ) -> Vec<f64> {
        let n_weights = self.net.weight_count();
        let n_offspring = self.config.population_size - self.config.n_elites - self.config.n_mutants;
        let start = Instant::now();
        let mut stop = false;
        let mut generation = 0;
        let mut best_fitness = f64::NEG_INFINITY;
        let mut best_weights: Vec<f64> = Vec::new();

        let mut population: Vec<Individual> = Vec::with_capacity(self.config.population_size);
        for _ in 0..self.config.population_size {
            if stop {
                break;
            }
            let ind = self.evaluated(random_weights(rng, n_weights, self.config.weight_limit));
            stop = start.elapsed().as_secs_f64() > self.config.time_limit;
            self.track(&start, generation, &ind, &mut best_fitness, &mut best_weights, observer);
            population.push(ind);
        }

        while !stop && self.config.max_generations.is_none_or(|cap| generation < cap) {
            population.sort_by(|a, b| b.fitness.total_cmp(&a.fitness));
            let mut next: Vec<Individual> = population[..self.config.n_elites].to_vec();

            for _ in 0..self.config.n_mutants {
                if stop {
                    break;
                }
                let ind = self.evaluated(random_weights(rng, n_weights, self.config.weight_limit));
                stop = start.elapsed().as_secs_f64() > self.config.time_limit;
                self.track(&start, generation, &ind, &mut best_fitness, &mut best_weights, observer);
                next.push(ind);
            }

            for _ in 0..n_offspring {
                if stop {
                    break;
                }
                let weights = match self.config.ga {
                    GaVariant::Rkga => rkga_crossover(rng, &population),
                    GaVariant::Brkga => brkga_crossover(
                        rng,
                        &population,
                        self.config.n_elites,
                        self.config.elite_inheritance_probability,
                    ),
                    GaVariant::Lexicase => {
                        let first = self.lexicase_parent(rng, &population);
                        let second = self.lexicase_parent(rng, &population);
                        uniform_crossover(
                            rng,
                            &population[first].weights,
                            &population[second].weights,
                            0.5,
                        )
                    }
                };
                let ind = self.evaluated(weights);
                stop = start.elapsed().as_secs_f64() > self.config.time_limit;
                self.track(&start, generation, &ind, &mut best_fitness, &mut best_weights, observer);
                next.push(ind);
            }

            population = next;
            if start.elapsed().as_secs_f64() > self.config.time_limit {
                stop = true;
            }
            generation += 1;
        }

        best_weights
    }

    fn evaluated(&mut self, weights: Vec<f64>) -> Individual {
        let fitness = self.mean_objective(&weights, self.training);
        Individual { weights, fitness }
    }

    // Mean beam-search objective of one weight vector over an instance
    // bank. The weights are loaded once, before the parallel region; the
    // workers read the network and the instances only.
    fn mean_objective(&mut self, weights: &[f64], instances: &[Instance]) -> f64 {
        self.net
            .store_weights(weights)
            .expect("candidate weight vectors are sized for the architecture");
        let total: f64 = if self.config.parallel {
            instances.par_iter().map(|inst| self.objective_on(inst)).sum()
        } else {
            instances.iter().map(|inst| self.objective_on(inst)).sum()
        };
        total / instances.len() as f64
    }

    fn objective_on(&self, inst: &Instance) -> f64 {
        BeamSearch {
            inst,
            net: &self.net,
            feature_config: self.feature_config,
            beam_width: self.config.beam_width,
            time_limit: self.config.bs_time_limit,
        }
        .objective() as f64
    }

    fn track(
        &mut self,
        start: &Instant,
        generation: usize,
        ind: &Individual,
        best_fitness: &mut f64,
        best_weights: &mut Vec<f64>,
        observer: &mut dyn TrainingObserver,
    ) {
        if ind.fitness > *best_fitness {
            *best_fitness = ind.fitness;
            *best_weights = ind.weights.clone();
            let validation_value = self.mean_objective(&ind.weights, self.validation);
            observer.incumbent(&Incumbent {
                elapsed: start.elapsed().as_secs_f64(),
                generation,
                fitness: ind.fitness,
                validation_value,
                weights: &ind.weights,
            });
        }
    }

    // Lexicase selection of one parent: visit the training instances in a
    // random order and keep only the candidates tying for the best
    // objective on each, until one survivor (or the instances run out).
    fn lexicase_parent<R: Rng>(&mut self, rng: &mut R, population: &[Individual]) -> usize {
        let mut order: Vec<usize> = (0..self.training.len()).collect();
        order.shuffle(rng);
        let mut candidates: Vec<usize> = (0..population.len()).collect();
        for &instance_idx in &order {
            if candidates.len() <= 1 {
                break;
            }
            let mut scores = Vec::with_capacity(candidates.len());
            for &c in &candidates {
                self.net
                    .store_weights(&population[c].weights)
                    .expect("candidate weight vectors are sized for the architecture");
                scores.push(self.objective_on(&self.training[instance_idx]));
            }
            let best = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            candidates = candidates
                .iter()
                .zip(&scores)
                .filter(|&(_, &score)| score == best)
                .map(|(&c, _)| c)
                .collect();
        }
        candidates[rng.random_range(0..candidates.len())]
    }
}

fn random_weights<R: Rng>(rng: &mut R, n: usize, limit: f64) -> Vec<f64> {
    (0..n).map(|_| rng.random_range(-limit..=limit)).collect()
}

fn uniform_crossover<R: Rng>(rng: &mut R, a: &[f64], b: &[f64], p_first: f64) -> Vec<f64> {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| if rng.random::<f64>() <= p_first { x } else { y })
        .collect()
}

fn rkga_crossover<R: Rng>(rng: &mut R, population: &[Individual]) -> Vec<f64> {
    let picked = rand::seq::index::sample(rng, population.len(), 2);
    uniform_crossover(
        rng,
        &population[picked.index(0)].weights,
        &population[picked.index(1)].weights,
        0.5,
    )
}

fn brkga_crossover<R: Rng>(
    rng: &mut R,
    population: &[Individual],
    n_elites: usize,
    elite_inheritance_probability: f64,
) -> Vec<f64> {
    let elite = rng.random_range(0..n_elites);
    let other = rng.random_range(n_elites..population.len());
    uniform_crossover(
        rng,
        &population[elite].weights,
        &population[other].weights,
        elite_inheritance_probability,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Instance;
    use crate::nnet::Activation;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct Recorder {
        events: Vec<(f64, usize, f64, f64, Vec<f64>)>,
    }

    impl TrainingObserver for Recorder {
        fn incumbent(&mut self, event: &Incumbent) {
            self.events.push((
                event.elapsed,
                event.generation,
                event.fitness,
                event.validation_value,
                event.weights.to_vec(),
            ));
        }
    }

    fn bank() -> Vec<Instance> {
        vec![
            Instance::parse("a", "1 2 0 0\n4 aabb").unwrap(),
            Instance::parse("b", "2 3 0 0\n3 abc\n3 acb").unwrap(),
        ]
    }

    fn config(ga: GaVariant, max_generations: usize) -> TrainerConfig {
        TrainerConfig {
            population_size: 6,
            n_elites: 1,
            n_mutants: 2,
            elite_inheritance_probability: 0.6,
            weight_limit: 1.0,
            time_limit: 1e9,
            bs_time_limit: 10.0,
            beam_width: 2,
            ga,
            parallel: false,
            max_generations: Some(max_generations),
        }
    }

    fn net() -> Mlp {
        Mlp::new(vec![9, 1], Activation::Tanh)
    }

    fn run(ga: GaVariant, seed: u64) -> (Vec<f64>, Vec<(f64, usize, f64, f64, Vec<f64>)>) {
        let training = bank();
        let validation = bank();
        let mut trainer = Trainer::new(
            config(ga, 2),
            net(),
            FeatureConfig::Base,
            &training,
            &validation,
        );
        let mut rng = StdRng::seed_from_u64(seed);
        let mut recorder = Recorder { events: Vec::new() };
        let best = trainer.train(&mut rng, &mut recorder);
        (best, recorder.events)
    }

    #[test]
    fn seeded_runs_reproduce_exactly() {
        for ga in [GaVariant::Rkga, GaVariant::Brkga, GaVariant::Lexicase] {
            let (best_a, events_a) = run(ga, 42);
            let (best_b, events_b) = run(ga, 42);
            assert_eq!(best_a, best_b);
            let fitness_a: Vec<_> = events_a.iter().map(|e| (e.2, e.4.clone())).collect();
            let fitness_b: Vec<_> = events_b.iter().map(|e| (e.2, e.4.clone())).collect();
            assert_eq!(fitness_a, fitness_b);
        }
    }

    #[test]
    fn incumbent_fitness_is_strictly_increasing() {
        let (_, events) = run(GaVariant::Rkga, 7);
        assert!(!events.is_empty());
        for pair in events.windows(2) {
            assert!(pair[1].2 > pair[0].2);
        }
    }

    #[test]
    fn returned_weights_match_the_last_incumbent() {
        let (best, events) = run(GaVariant::Brkga, 11);
        assert_eq!(best, events.last().unwrap().4);
        assert_eq!(best.len(), net().weight_count());
    }

    #[test]
    fn zero_time_limit_stops_after_the_first_evaluation() {
        let training = bank();
        let validation = bank();
        let mut cfg = config(GaVariant::Rkga, 100);
        cfg.time_limit = 0.0;
        let mut trainer = Trainer::new(cfg, net(), FeatureConfig::Base, &training, &validation);
        let mut rng = StdRng::seed_from_u64(3);
        let mut recorder = Recorder { events: Vec::new() };
        let best = trainer.train(&mut rng, &mut recorder);
        assert_eq!(recorder.events.len(), 1);
        assert_eq!(best, recorder.events[0].4);
    }

    #[test]
    fn uniform_crossover_takes_every_weight_from_a_parent() {
        let mut rng = StdRng::seed_from_u64(5);
        let a = vec![1.0; 32];
        let b = vec![2.0; 32];
        let child = uniform_crossover(&mut rng, &a, &b, 0.5);
        assert!(child.iter().all(|w| *w == 1.0 || *w == 2.0));
        assert_eq!(uniform_crossover(&mut rng, &a, &b, 1.0), a);
    }

    #[test]
    fn rkga_picks_two_distinct_parents() {
        let mut rng = StdRng::seed_from_u64(9);
        let population = vec![
            Individual {
                weights: vec![1.0; 8],
                fitness: 0.0,
            },
            Individual {
                weights: vec![2.0; 8],
                fitness: 0.0,
            },
        ];
        for _ in 0..20 {
            let child = rkga_crossover(&mut rng, &population);
            assert!(child.iter().all(|w| *w == 1.0 || *w == 2.0));
        }
    }

    #[test]
    fn brkga_first_parent_is_an_elite() {
        let mut rng = StdRng::seed_from_u64(13);
        let population = vec![
            Individual {
                weights: vec![1.0; 8],
                fitness: 3.0,
            },
            Individual {
                weights: vec![2.0; 8],
                fitness: 1.0,
            },
            Individual {
                weights: vec![3.0; 8],
                fitness: 0.5,
            },
        ];
        // with full elite inheritance every weight comes from the elite
        let child = brkga_crossover(&mut rng, &population, 1, 1.0);
        assert_eq!(child, vec![1.0; 8]);
    }

    #[test]
    fn ga_ids_map_like_the_configuration_knob() {
        assert_eq!(GaVariant::from_id(1), Some(GaVariant::Rkga));
        assert_eq!(GaVariant::from_id(2), Some(GaVariant::Brkga));
        assert_eq!(GaVariant::from_id(3), Some(GaVariant::Lexicase));
        assert_eq!(GaVariant::from_id(0), None);
    }
}
