use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, Category, PromptOption};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextField {
    Environment,
    Descriptors,
}

/// One chosen option per category plus the two free-text fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectionState {
    pub subject: PromptOption,
    pub style: PromptOption,
    pub artist: PromptOption,
    pub medium: PromptOption,
    pub vibe: PromptOption,
    pub environment: String,
    pub descriptors: String,
}

impl SelectionState {
    pub fn initial(catalog: &Catalog, environment: &str, descriptors: &str) -> Self {
        Self {
            subject: catalog.first(Category::Subject),
            style: catalog.first(Category::Style),
            artist: catalog.first(Category::Artist),
            medium: catalog.first(Category::Medium),
            vibe: catalog.first(Category::Vibe),
            environment: environment.to_string(),
            descriptors: descriptors.to_string(),
        }
    }

    pub fn selected(&self, category: Category) -> &PromptOption {
        match category {
            Category::Subject => &self.subject,
            Category::Style => &self.style,
            Category::Artist => &self.artist,
            Category::Medium => &self.medium,
            Category::Vibe => &self.vibe,
        }
    }

    pub fn select(&mut self, category: Category, option: PromptOption) {
        let slot = match category {
            Category::Subject => &mut self.subject,
            Category::Style => &mut self.style,
            Category::Artist => &mut self.artist,
            Category::Medium => &mut self.medium,
            Category::Vibe => &mut self.vibe,
        };
        *slot = option;
    }

    /// Stored as typed. No trimming: the prompt carries the text verbatim.
    pub fn set_text(&mut self, field: TextField, value: &str) {
        match field {
            TextField::Environment => self.environment = value.to_string(),
            TextField::Descriptors => self.descriptors = value.to_string(),
        }
    }
}

pub fn compose_prompt(state: &SelectionState) -> String {
    format!(
        "Depict Nate as {} in the style of {}, artistically inspired by {}, using {}, {}, with {}, with {}",
        state.subject.name,
        state.style.name,
        state.artist.name,
        state.medium.name,
        state.vibe.name,
        state.environment,
        state.descriptors,
    )
}

#[cfg(test)]
mod tests {
    use super::{compose_prompt, SelectionState, TextField};
    use crate::catalog::{
        Catalog, Category, PromptOption, INITIAL_DESCRIPTORS, INITIAL_ENVIRONMENT,
    };

    fn initial() -> SelectionState {
        SelectionState::initial(&Catalog::default(), INITIAL_ENVIRONMENT, INITIAL_DESCRIPTORS)
    }

    #[test]
    fn initial_selection_matches_worked_example() {
        let out = compose_prompt(&initial());
        assert_eq!(
            out,
            "Depict Nate as Tony Stark in the style of a comic book character, artistically inspired by Greg Rutkowski, Syd Mead, James Gilleard, using cell-shaded illustration, low detail, cyberpunk, metallic, futuristic, with background bokeh, abstract, colorful, busy cityscape, with 4k, UHD, intricate, elegant, artstation"
        );
    }

    #[test]
    fn repeated_calls_are_identical() {
        let state = initial();
        assert_eq!(compose_prompt(&state), compose_prompt(&state));
    }

    #[test]
    fn selections_and_text_flow_into_fixed_slots() {
        let catalog = Catalog::default();
        let mut state = initial();
        let spider = catalog
            .find(Category::Subject, 5)
            .cloned()
            .expect("spider-man option");
        state.select(Category::Subject, spider);
        state.select(Category::Vibe, PromptOption::new(3, "travelling in space"));
        state.set_text(TextField::Environment, "");
        state.set_text(TextField::Descriptors, "  8k  ");

        let out = compose_prompt(&state);
        assert!(out.starts_with("Depict Nate as Spider-Man in the style of"));
        assert!(out.contains("low detail, travelling in space, with , with   8k  "));
        assert_eq!(state.selected(Category::Subject).id, 5);
    }
}
