//! Fixed scenario vocabularies for fire/smoke detection imagery.

/// Places a fire could start in.
pub const ENVIRONMENTS: &[&str] = &[
    "dense forest",
    "pine forest",
    "oak woodland",
    "eucalyptus forest",
    "urban residential area",
    "apartment complex",
    "suburban neighborhood",
    "city center",
    "industrial factory",
    "chemical plant",
    "oil refinery",
    "manufacturing facility",
    "warehouse",
    "office building",
    "shopping mall",
    "school campus",
    "rural landscape",
    "farmland",
    "mountain terrain",
    "grassland",
    "national park",
    "wilderness area",
    "campground",
    "hiking trail",
];

/// Time of day combined with weather conditions.
pub const TIME_WEATHER: &[&str] = &[
    "early morning with clear sky",
    "bright sunny day",
    "cloudy afternoon",
    "sunset with orange sky",
    "dusk with fading light",
    "night with moonlight",
    "foggy morning",
    "misty conditions",
    "after light rain",
    "windy day",
    "humid summer day",
    "dry autumn afternoon",
    "cold winter morning",
    "spring evening",
];

/// Fire and smoke development stages, earliest first.
pub const FIRE_STAGES: &[&str] = &[
    "very early stage with barely visible thin smoke wisp rising between trees",
    "small amount of white smoke rising slowly, no visible flames yet",
    "thin smoke column starting to form, barely noticeable",
    "light gray smoke beginning to accumulate near ground level",
    "small smoke plume developing, with tiny ember just becoming visible",
    "early smoke formation with first small flames beginning to appear",
    "visible smoke with small flames starting to spread",
    "moderate smoke development with growing flames",
    "thickening smoke with established fire beginning to spread",
];

/// Camera points of view.
pub const POVS: &[&str] = &[
    "aerial drone view from 50 meters height",
    "aerial drone view from 100 meters height",
    "security camera perspective mounted on pole",
    "security camera view from building",
    "ground level perspective",
    "from distance of 100 meters",
    "from hillside overlooking area",
    "from forest watchtower",
    "through trees",
    "from road perspective",
];

/// The four enumerations a scenario is drawn from.
///
/// Passed into the sampler explicitly so tests can swap in tiny tables.
/// Every table is non-empty.
#[derive(Debug, Clone, Copy)]
pub struct Vocabulary {
    environments: &'static [&'static str],
    time_weather: &'static [&'static str],
    fire_stages: &'static [&'static str],
    povs: &'static [&'static str],
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            environments: ENVIRONMENTS,
            time_weather: TIME_WEATHER,
            fire_stages: FIRE_STAGES,
            povs: POVS,
        }
    }
}

impl Vocabulary {
    /// Builds a vocabulary from custom tables. Returns `None` if any table is empty.
    pub fn new(
        environments: &'static [&'static str],
        time_weather: &'static [&'static str],
        fire_stages: &'static [&'static str],
        povs: &'static [&'static str],
    ) -> Option<Self> {
        if environments.is_empty()
            || time_weather.is_empty()
            || fire_stages.is_empty()
            || povs.is_empty()
        {
            return None;
        }
        Some(Self {
            environments,
            time_weather,
            fire_stages,
            povs,
        })
    }

    pub fn environments(&self) -> &'static [&'static str] {
        self.environments
    }

    pub fn time_weather(&self) -> &'static [&'static str] {
        self.time_weather
    }

    pub fn fire_stages(&self) -> &'static [&'static str] {
        self.fire_stages
    }

    pub fn povs(&self) -> &'static [&'static str] {
        self.povs
    }

    /// Number of distinct scenarios this vocabulary can produce.
    pub fn combinations(&self) -> usize {
        self.environments.len() * self.time_weather.len() * self.fire_stages.len() * self.povs.len()
    }
}
