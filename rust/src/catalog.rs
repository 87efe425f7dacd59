use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_RETRIES: u32 = 20;
pub const INITIAL_ENVIRONMENT: &str = "background bokeh, abstract, colorful, busy cityscape";
pub const INITIAL_DESCRIPTORS: &str = "4k, UHD, intricate, elegant, artstation";
pub const WARMING_MESSAGE: &str = "The Nate machine is warming up... please wait a moment.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptOption {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub unavailable: bool,
}

impl PromptOption {
    pub fn new(id: u32, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            unavailable: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Subject,
    Style,
    Artist,
    Medium,
    Vibe,
}

impl Category {
    /// Prompt order. The composer relies on it.
    pub const ALL: [Category; 5] = [
        Category::Subject,
        Category::Style,
        Category::Artist,
        Category::Medium,
        Category::Vibe,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Category::Subject => "subject",
            Category::Style => "style",
            Category::Artist => "artist",
            Category::Medium => "medium",
            Category::Vibe => "vibe",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Subject => "Depict Nate as",
            Category::Style => "in the style of",
            Category::Artist => "Artist Inspiration",
            Category::Medium => "Medium",
            Category::Vibe => "Vibe",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.key() == key.trim())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    subjects: Vec<PromptOption>,
    styles: Vec<PromptOption>,
    artists: Vec<PromptOption>,
    mediums: Vec<PromptOption>,
    vibes: Vec<PromptOption>,
}

impl Catalog {
    pub fn options(&self, category: Category) -> &[PromptOption] {
        match category {
            Category::Subject => &self.subjects,
            Category::Style => &self.styles,
            Category::Artist => &self.artists,
            Category::Medium => &self.mediums,
            Category::Vibe => &self.vibes,
        }
    }

    /// Replaces a category list. Empty lists are ignored so every category
    /// keeps at least one option.
    pub fn set_options(&mut self, category: Category, options: Vec<PromptOption>) {
        if options.is_empty() {
            return;
        }
        let slot = match category {
            Category::Subject => &mut self.subjects,
            Category::Style => &mut self.styles,
            Category::Artist => &mut self.artists,
            Category::Medium => &mut self.mediums,
            Category::Vibe => &mut self.vibes,
        };
        *slot = options;
    }

    pub fn find(&self, category: Category, id: u32) -> Option<&PromptOption> {
        self.options(category).iter().find(|o| o.id == id)
    }

    /// First selectable option, falling back to the head of the list when
    /// every entry is flagged unavailable.
    pub fn first(&self, category: Category) -> PromptOption {
        let options = self.options(category);
        options
            .iter()
            .find(|o| !o.unavailable)
            .or_else(|| options.first())
            .cloned()
            .unwrap_or_else(|| PromptOption::new(0, ""))
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            subjects: build(&[
                "Tony Stark",
                "himself",
                "Neo (The Matrix 1999)",
                "Buzz Lightyear",
                "Spider-Man",
                "Maverick (Top Gun)",
            ]),
            styles: build(&[
                "a comic book character",
                "a computer animated Pixar character",
                "a renaissance portrait",
                "an anime character",
                "a cartoon drawing",
                "a studio portrait",
            ]),
            artists: build(&[
                "Greg Rutkowski, Syd Mead, James Gilleard",
                "Vincent Van Gogh, Pablo Picasso, Paul Cezanne",
                "Leonardo Da Vinci, Michelangelo Buonarroti",
                "Jack Kirby, Stan Lee, Jim Lee, John Byrne",
                "Stanley Artgerm Lau",
            ]),
            mediums: build(&[
                "cell-shaded illustration, low detail",
                "hyper realistic, highly detailed",
                "oil painting on canvas, dynamic textures",
                "pastel art, muted colors",
            ]),
            vibes: build(&[
                "cyberpunk, metallic, futuristic",
                "warm colors, dynamic, studio lighting",
                "travelling in space",
            ]),
        }
    }
}

fn build(names: &[&str]) -> Vec<PromptOption> {
    names
        .iter()
        .enumerate()
        .map(|(index, name)| PromptOption::new(index as u32 + 1, name))
        .collect()
}
