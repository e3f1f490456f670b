use crate::model::{Category, SelectedItem};
use uuid::Uuid;

/// A change to item selection flags. The only way selection is mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Toggle { category: Uuid, item: Uuid },
    SelectCategory(Uuid),
    DeselectCategory(Uuid),
    SelectAll,
    DeselectAll,
    /// Selects every item of categories whose name contains the text,
    /// ignoring case.
    SelectMatching(String),
}

impl Selection {
    pub fn apply(&self, categories: &mut [Category]) {
        match self {
            Self::Toggle { category, item } => {
                if let Some(item) = categories
                    .iter_mut()
                    .find(|c| c.id == *category)
                    .and_then(|c| c.items.iter_mut().find(|i| i.id == *item))
                {
                    item.is_selected = !item.is_selected;
                }
            }
            Self::SelectCategory(id) => set_category(categories, *id, true),
            Self::DeselectCategory(id) => set_category(categories, *id, false),
            Self::SelectAll => set_all(categories.iter_mut(), true),
            Self::DeselectAll => set_all(categories.iter_mut(), false),
            Self::SelectMatching(text) => {
                let needle = text.to_lowercase();
                set_all(
                    categories
                        .iter_mut()
                        .filter(|c| c.name.to_lowercase().contains(&needle)),
                    true,
                );
            }
        }
    }
}

fn set_category(categories: &mut [Category], id: Uuid, selected: bool) {
    set_all(categories.iter_mut().filter(|c| c.id == id), selected);
}

fn set_all<'a>(categories: impl Iterator<Item = &'a mut Category>, selected: bool) {
    for category in categories {
        for item in &mut category.items {
            item.is_selected = selected;
        }
    }
}

/// Copies the currently selected items out of the result set.
pub fn snapshot(categories: &[Category]) -> Vec<SelectedItem> {
    categories
        .iter()
        .flat_map(|c| {
            c.items
                .iter()
                .filter(|i| i.is_selected)
                .map(|i| SelectedItem {
                    category_name: c.name.clone(),
                    item: i.clone(),
                })
        })
        .collect()
}

pub fn total_selected_size(categories: &[Category]) -> u64 {
    categories.iter().map(Category::selected_size).sum()
}

pub fn total_selected_count(categories: &[Category]) -> usize {
    categories.iter().map(Category::selected_count).sum()
}
