/// Knobs shared by a [`Generator`][crate::generator::Generator] and everything it builds.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Size of a vector whose size variable has no value after solving.
    pub default_vector_size: usize,
    /// Upper bound asserted on every constrained vector size.
    pub max_vector_size: usize,
    /// Skip contradiction and soft-constraint analysis, and single-variable presolving.
    pub bypass_constraint_analysis: bool,
    /// Build and solve partitions on worker threads.
    pub multithreaded: bool,
    /// Pre-sample each unconstrained-by-others variable from its own constraints.
    pub single_var_presolve: bool,
    /// Seed for solver construction. `None` seeds from entropy.
    pub seed: Option<u64>,
    /// Unique table size (log2) of each BDD solver.
    pub storage_bits: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            default_vector_size: 5,
            max_vector_size: 1000,
            bypass_constraint_analysis: false,
            multithreaded: false,
            single_var_presolve: true,
            seed: None,
            storage_bits: 16,
        }
    }
}

impl GeneratorConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_multithreading(mut self, multithreaded: bool) -> Self {
        self.multithreaded = multithreaded;
        self
    }

    pub fn with_bypass_constraint_analysis(mut self, bypass: bool) -> Self {
        self.bypass_constraint_analysis = bypass;
        self
    }

    pub fn with_default_vector_size(mut self, size: usize) -> Self {
        self.default_vector_size = size;
        self
    }

    pub fn with_max_vector_size(mut self, size: usize) -> Self {
        self.max_vector_size = size;
        self
    }
}
