use crate::error::{AmosError, Result};
use crate::model::{Component, InsertPolicy};
use crate::stage::Stage;

/// Stage every live string of `source` that `target` lacks (or has
/// deleted) under the identity of `target`, typically to carry a
/// translation over from another branch. Returns the number of staged
/// strings.
pub fn merge_translations(source: &Component, target: &Component, stage: &mut Stage) -> Result<usize> {
    if source.name() != target.name() || source.language() != target.language() {
        return Err(AmosError::ComponentMismatch(format!(
            "cannot merge {} into {}",
            source.key(),
            target.key()
        )));
    }
    let mut merged = target.empty_like();
    for string in source.strings() {
        if string.deleted || target.has_live_string(&string.id) {
            continue;
        }
        merged.add_string(string.clone(), InsertPolicy::Overwrite)?;
    }
    let count = merged.len();
    if count > 0 {
        stage.add(&merged, InsertPolicy::Overwrite)?;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LangString;
    use crate::test_support::version;

    fn component(lang: &str, code: i32, strings: &[(&str, Option<&str>)]) -> Component {
        let mut c = Component::new("forum", lang, version(code));
        for (id, text) in strings {
            let string = match text {
                Some(text) => LangString::new(*id, *text, 1),
                None => LangString::tombstone(*id, 1),
            };
            c.add_string(string, InsertPolicy::Fail).unwrap();
        }
        c
    }

    #[test]
    fn missing_and_deleted_strings_are_staged() -> Result<()> {
        let source = component("fr", 402, &[("a", Some("A")), ("b", Some("B")), ("c", Some("C")), ("gone", None)]);
        let target = component("fr", 400, &[("a", Some("old A")), ("b", None)]);
        let mut stage = Stage::new();

        assert_eq!(merge_translations(&source, &target, &mut stage)?, 2);
        let staged = stage.get_component("forum", "fr", &version(400)).unwrap();
        assert_eq!(staged.string_ids().collect::<Vec<_>>(), vec!["b", "c"]);
        Ok(())
    }

    #[test]
    fn mismatched_components_are_rejected() {
        let source = component("fr", 402, &[("a", Some("A"))]);
        let target = component("de", 400, &[]);
        let mut stage = Stage::new();
        assert!(matches!(
            merge_translations(&source, &target, &mut stage),
            Err(AmosError::ComponentMismatch(_))
        ));
        assert!(stage.is_empty());
    }
}
