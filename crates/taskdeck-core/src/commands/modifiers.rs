use chrono::NaiveDate;
use tracing::{
  instrument,
  warn
};

use crate::datetime::parse_due_expr;
use crate::task::{
  Priority,
  Status,
  TaskDraft,
  TaskPatch
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Mod {
  Status(Status),
  Priority(Priority),
  Due(Option<NaiveDate>),
  Description(Option<String>)
}

/// Splits command arguments into title
/// words and `key:value` modifiers. After
/// `--` everything is a title word.
#[instrument(skip(args, today))]
pub(crate) fn parse_title_and_mods(
  args: &[String],
  today: NaiveDate
) -> anyhow::Result<(Vec<String>, Vec<Mod>)>
{
  let mut title_parts = Vec::new();
  let mut mods = Vec::new();

  let mut literal = false;
  for arg in args {
    if arg == "--" {
      literal = true;
      continue;
    }

    if !literal
      && let Some(one_mod) =
        parse_one_mod(arg, today)?
    {
      mods.push(one_mod);
      continue;
    }

    title_parts.push(arg.clone());
  }

  Ok((title_parts, mods))
}

fn parse_one_mod(
  tok: &str,
  today: NaiveDate
) -> anyhow::Result<Option<Mod>> {
  let (key, value) =
    if let Some((k, v)) =
      tok.split_once(':')
    {
      (k, v)
    } else if let Some((k, v)) =
      tok.split_once('=')
    {
      (k, v)
    } else {
      return Ok(None);
    };

  let key = key.to_ascii_lowercase();

  match key.as_str() {
    | "status" => {
      Ok(Some(Mod::Status(
        value.parse()?
      )))
    }
    | "pri" | "priority" => {
      Ok(Some(Mod::Priority(
        value.parse()?
      )))
    }
    | "due" => {
      if value.trim().is_empty() {
        return Ok(Some(Mod::Due(None)));
      }
      Ok(Some(Mod::Due(Some(
        parse_due_expr(value, today)?
      ))))
    }
    | "desc" | "description" => {
      let text = value.trim();
      Ok(Some(Mod::Description(
        (!text.is_empty())
          .then(|| text.to_string())
      )))
    }
    | _ => Ok(None)
  }
}

pub(crate) fn apply_to_draft(
  draft: &mut TaskDraft,
  mods: &[Mod]
) {
  for one_mod in mods {
    match one_mod {
      | Mod::Status(status) => {
        draft.status = *status;
      }
      | Mod::Priority(priority) => {
        draft.priority = *priority;
      }
      | Mod::Due(due) => {
        draft.due_date = *due;
      }
      | Mod::Description(text) => {
        draft.description =
          text.clone();
      }
    }
  }
}

/// Later modifiers win over earlier
/// ones for the same field.
pub(crate) fn mods_to_patch(
  title_words: &[String],
  mods: &[Mod]
) -> TaskPatch {
  let mut patch = TaskPatch::default();
  if !title_words.is_empty() {
    patch.title =
      Some(title_words.join(" "));
  }

  for one_mod in mods {
    match one_mod {
      | Mod::Status(status) => {
        if patch.status.is_some() {
          warn!(
            "status given twice; \
             using the last one"
          );
        }
        patch.status = Some(*status);
      }
      | Mod::Priority(priority) => {
        patch.priority =
          Some(*priority);
      }
      | Mod::Due(due) => {
        patch.due_date = Some(*due);
      }
      | Mod::Description(text) => {
        patch.description =
          Some(text.clone());
      }
    }
  }

  patch
}

#[cfg(test)]
mod tests {
  use super::*;

  fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 18)
      .expect("valid date")
  }

  fn args(raw: &[&str]) -> Vec<String> {
    raw
      .iter()
      .map(ToString::to_string)
      .collect()
  }

  #[test]
  fn separates_title_from_modifiers() {
    let (words, mods) =
      parse_title_and_mods(
        &args(&[
          "Buy",
          "milk",
          "pri:high",
          "due:tomorrow",
          "desc:two litres"
        ]),
        today()
      )
      .expect("parse");
    assert_eq!(words, ["Buy", "milk"]);
    assert_eq!(
      mods,
      vec![
        Mod::Priority(Priority::High),
        Mod::Due(Some(
          NaiveDate::from_ymd_opt(
            2026, 10, 19
          )
          .expect("valid date")
        )),
        Mod::Description(Some(
          "two litres".to_string()
        )),
      ]
    );
  }

  #[test]
  fn double_dash_makes_rest_literal() {
    let (words, mods) =
      parse_title_and_mods(
        &args(&[
          "status:done",
          "--",
          "ratio",
          "3:2"
        ]),
        today()
      )
      .expect("parse");
    assert_eq!(words, ["ratio", "3:2"]);
    assert_eq!(
      mods,
      vec![Mod::Status(Status::Done)]
    );
  }

  #[test]
  fn empty_values_clear_nullable_fields()
  {
    let (words, mods) =
      parse_title_and_mods(
        &args(&["due:", "desc:"]),
        today()
      )
      .expect("parse");
    let patch =
      mods_to_patch(&words, &mods);
    assert_eq!(patch.title, None);
    assert_eq!(
      patch.due_date,
      Some(None)
    );
    assert_eq!(
      patch.description,
      Some(None)
    );
  }

  #[test]
  fn bad_values_are_errors() {
    assert!(
      parse_title_and_mods(
        &args(&["pri:urgent"]),
        today()
      )
      .is_err()
    );
    assert!(
      parse_title_and_mods(
        &args(&["due:someday"]),
        today()
      )
      .is_err()
    );
  }
}
