use std::collections::HashMap;

use envconfig::Envconfig;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    // Trial design constant, the observed protocol value is 14.
    #[envconfig(default = "14")]
    pub min_group_size: usize,

    #[envconfig(default = "default")]
    pub randomizer_name: String,

    #[envconfig(default = "999")]
    pub protocol_number: String,

    #[envconfig(default = "randomization_list.csv")]
    pub randomization_list_path: String,

    #[envconfig(default = "group.json")]
    pub group_path: String,
}

impl Config {
    /// All defaults, without reading the process environment.
    pub fn default_test_config() -> Self {
        Self::init_from_hashmap(&HashMap::new()).expect("defaults are valid")
    }
}
