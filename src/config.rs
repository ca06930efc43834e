use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context as _, Result, bail};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "media_scraper.toml";
pub const TOKEN_ENV: &str = "DISCORD_TOKEN";

const MAX_PAGE_SIZE: u8 = 100;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub channel_id: Option<u64>,
    pub output_dir: PathBuf,
    pub proxy: Option<String>,
    pub page_size: u8,
    pub request_delay_ms: u64,
    pub categories: Vec<CategoryConfig>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CategoryConfig {
    pub name: String,
    pub keywords: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel_id: None,
            output_dir: PathBuf::from("."),
            proxy: None,
            page_size: MAX_PAGE_SIZE,
            request_delay_ms: 100,
            categories: default_categories(),
        }
    }
}

impl Config {
    /// Reads `path`, or the default file in the working directory. A missing
    /// default file yields defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        if !path.exists() {
            if explicit {
                bail!("config file {} does not exist", path.display());
            }
            log::debug!("no {} found, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            bail!("page_size must be between 1 and {MAX_PAGE_SIZE}, got {}", self.page_size);
        }
        if let Some(empty) = self.categories.iter().find(|c| c.name.trim().is_empty()) {
            bail!("category with keywords {:?} has an empty name", empty.keywords);
        }
        Ok(())
    }

    pub fn token() -> Result<String> {
        std::env::var(TOKEN_ENV).with_context(|| format!("{TOKEN_ENV} not found in environment"))
    }
}

fn category(name: &str, keywords: &[&str]) -> CategoryConfig {
    CategoryConfig {
        name: name.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
    }
}

/// Topic table used when the config file does not define `[[categories]]`.
/// Order matters: the first category with a matching keyword wins.
pub fn default_categories() -> Vec<CategoryConfig> {
    vec![
        category("01_Microbiology", &[
            "microbiology", "bacteria", "virus", "virology", "vibrionaceae",
            "spirillaceae", "actinomycetaceae", "spirochaetales", "escherichia",
            "klebsiella", "salmonella", "proteus", "brucellaceae", "neisseria",
            "corynebacteriaceae", "bacterial", "pathogen", "parasitology",
            "herpesviridae", "hepadnaviridae", "poxviridae", "papovaviridae",
            "parpoviridae", "adenoviridae", "evasion mechanism", "malaria",
            "pfalciparum", "pvivax", "pmalariae", "povale",
        ]),
        category("02_Clinical_Chemistry", &[
            "clinical chemistry", "chemistry", "kidney", "blood gases", "liver",
            "lipid profile", "cardiac markers", "tumour markers", "glucose",
            "biochemistry", "enzymes", "hormones", "proteolytic",
        ]),
        category("03_Hematology", &[
            "haematology", "hematology", "blood", "anaemia", "anemia",
            "macrocytic", "microcytic", "normocytic", "hemolytic", "hemostasis",
            "crossmatch", "blood group", "transfusion", "ahg", "grouping antisera",
            "phlebotomy", "coagulation",
        ]),
        category("04_Histopathology_Cytopathology", &[
            "histopathology", "histology", "cytopathology", "pap smear", "pap-smear",
            "museum techniques", "staining", "adhesives", "mounting", "ringing",
            "histotechniques", "tissue", "biopsy", "cytology",
        ]),
        category("05_Immunology", &[
            "immunology", "immune", "immunodeficiency", "hiv", "sti", "elisa",
            "flow cytometry", "antibody", "antigen", "serology",
        ]),
        category("06_Emergency_Medical_Services", &[
            "ems", "emergency", "trauma", "medical emergencies", "incident command",
            "ics", "disaster", "head injury", "triage", "prehospital",
            "special population", "emergency drugs", "environmental emergencies",
        ]),
        category("07_Orthopedics_Rehabilitation", &[
            "orthopedics", "orthopaedics", "fracture", "dislocation", "femur",
            "tibia", "fibula", "humerus", "radius", "shoulder", "elbow", "hip",
            "biomechanics", "traction", "genu", "talipes", "equino-varus",
            "osteomyelitis", "osteoarthritis", "osteoporosis", "rickets",
            "osteomalacia", "arthritis", "rheumatoid", "gouty", "septic",
            "pyogenic", "ankylosing spondylitis", "tumours of bone",
            "rehabilitation", "physiotherapy", "exercise therapy", "electrotherapy",
            "cbr", "community based rehabilitation",
        ]),
        category("08_Surgery_Perioperative", &[
            "surgery", "perioperative", "cancer surgery", "chemotherapy",
            "surgical", "operative", "forensic", "palliative",
        ]),
        category("09_Medicine_Specialty", &[
            "medicine", "paediatrics", "pediatrics", "pathology", "pathophysiology",
            "pharmacology", "therapeutics", "psychiatry", "psychology",
            "dermatology", "ophthalmology", "opthalmology", "e n t", "ent",
            "genito-urinary", "grief", "bereavement", "end of life",
        ]),
        category("10_Community_Public_Health", &[
            "community health", "public health", "epidemiology", "communicable diseases",
            "immunizable", "childhood immunizable", "imci", "i m c i",
            "vector borne", "ivbd", "i v b d", "maternal", "child health",
            "nutrition", "primary health care", "disease prevention",
            "community diagnosis", "community strategy", "environment and health",
            "drug and substance abuse", "occupational health",
        ]),
        category("11_Leadership_Management", &[
            "leadership", "management", "mngt", "hsm", "health service management",
            "human resource", "delegation", "decision making", "theories",
            "principles", "functions of management", "conflict management",
            "organization", "essential medicine", "commodities", "supplies",
            "financial resource", "monitoring", "evaluation", "project management",
            "quality assurance", "resource management",
        ]),
        category("12_Health_Informatics_IT", &[
            "health information", "informatics", "h i s", "hospital system",
            "lims", "computer", "communication", "networking", "data collection",
            "health records", "health statistics",
        ]),
        category("13_Research_Biostatistics", &[
            "research", "biostatistics", "statistics", "sampling", "sample size",
            "research design", "problem selection", "data collection", "citation",
            "reference", "measures of relationship", "data analysis",
        ]),
        category("14_Medical_Imaging", &[
            "imaging", "radiography", "image processing", "imaging equipment",
            "imaging therapeutic", "radiology", "x-ray",
        ]),
        category("15_Pharmacy", &[
            "pharmaceutical", "pharmacy", "medicinal chemistry", "pharmacognosy",
            "phytochemistry", "physical pharmaceutics", "pharmaceutical engineering",
            "pharmaceutical jurisprudence", "pharmaceutical industry",
        ]),
        category("16_Health_Safety_Ethics", &[
            "health and safety", "biosafety", "safety", "law", "ethics",
            "gender", "law governing", "kenya biosafety",
        ]),
        category("17_Exams_CATs_FQE", &[
            "exam", "cat", "fqe", "question paper", "mcq", "revision",
            "past paper", "test", "quiz", "pyq", "draft",
        ]),
        category("18_Course_Outlines_Notes", &[
            "course outline", "notes", "lecture", "unit-", "unit ",
        ]),
    ]
}
