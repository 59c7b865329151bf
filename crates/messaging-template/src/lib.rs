//! Template Renderer (§4.1): pick a translation by preferred language, decode its base64 body,
//! render it against a per-recipient content map. Rendering is side-effect-free and deterministic.
//!
//! Grounded on `crates/cloudillo-email/src/template.rs`'s strict-mode Handlebars engine, stripped of
//! its frontmatter/filesystem/layout machinery — bodies here always arrive as DB-resident base64
//! text, never `.hbs` files on disk.

use std::collections::HashMap;

use base64::Engine as _;
use handlebars::Handlebars;
use messaging_types::prelude::*;

pub struct RenderResult {
	pub subject: String,
	pub content: String,
}

pub struct TemplateEngine {
	handlebars: Handlebars<'static>,
}

impl Default for TemplateEngine {
	fn default() -> Self {
		let mut handlebars = Handlebars::new();
		handlebars.set_strict_mode(true);
		Self { handlebars }
	}
}

impl TemplateEngine {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the translation whose `lang` matches `lang`; failing that, the one whose `lang`
	/// equals the template's `defaultLanguage` (§4.1).
	pub fn pick_translation<'a>(
		template: &'a EmailTemplate,
		lang: &str,
	) -> MessagingResult<&'a messaging_types::types::Translation> {
		template
			.translations
			.iter()
			.find(|t| t.lang == lang)
			.or_else(|| template.translations.iter().find(|t| t.lang == template.default_language))
			.ok_or(Error::NotFound)
	}

	/// Decodes and renders one body against `vars`. `name` is only used for diagnostics, matching
	/// the source's `messageType+lang` naming of the parsed template.
	pub fn render(&self, name: &str, body_base64: &str, vars: &HashMap<String, String>) -> MessagingResult<String> {
		let decoded = base64::engine::general_purpose::STANDARD.decode(body_base64)?;
		let body = String::from_utf8(decoded).map_err(|_| Error::Parse)?;
		if body.trim().is_empty() {
			warn!(template = name, "empty template body");
			return Err(Error::ValidationError(format!("empty template `{name}`")));
		}
		self.handlebars.render_template(&body, vars).map_err(|e| {
			warn!(template = name, error = %e, "template render failed");
			Error::ValidationError(format!("could not parse template `{name}`: {e}"))
		})
	}

	/// Picks the translation for `lang`, decodes and renders subject and content, returns both.
	pub fn render_translation(
		&self,
		message_type: &str,
		template: &EmailTemplate,
		lang: &str,
		vars: &HashMap<String, String>,
	) -> MessagingResult<RenderResult> {
		let translation = Self::pick_translation(template, lang)?;
		let name = format!("{message_type}{lang}");
		let content = self.render(&name, &translation.template_def, vars)?;
		Ok(RenderResult { subject: translation.subject.clone(), content })
	}

	/// Returns an error if `translations` is empty or any body fails base64-decode or fails to
	/// parse against an empty variable map; invoked at schedule-save time (§4.1).
	pub fn check_all_parsable(&self, template: &EmailTemplate) -> MessagingResult<()> {
		if template.translations.is_empty() {
			return Err(Error::ValidationError(format!(
				"translation list is empty for `{}`",
				template.message_type
			)));
		}
		let empty_vars = HashMap::new();
		for translation in &template.translations {
			let name = format!("{}{}", template.message_type, translation.lang);
			self.render(&name, &translation.template_def, &empty_vars)?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn template(translations: Vec<(&str, &str, &str)>, default_lang: &str) -> EmailTemplate {
		EmailTemplate {
			message_type: MessageType::Weekly,
			study_key: None,
			default_language: default_lang.into(),
			translations: translations
				.into_iter()
				.map(|(lang, subject, body)| messaging_types::types::Translation {
					lang: lang.into(),
					subject: subject.into(),
					template_def: base64::engine::general_purpose::STANDARD.encode(body),
				})
				.collect(),
			header_overrides: None,
		}
	}

	#[test]
	fn picks_exact_language_match() {
		let t = template(vec![("en", "Hi", "hi"), ("hu", "Szia", "szia")], "en");
		let picked = TemplateEngine::pick_translation(&t, "hu").unwrap();
		assert_eq!(picked.lang, "hu");
	}

	#[test]
	fn falls_back_to_default_language() {
		let t = template(vec![("en", "Hi", "hi"), ("hu", "Szia", "szia")], "en");
		let picked = TemplateEngine::pick_translation(&t, "fr").unwrap();
		assert_eq!(picked.lang, "en");
	}

	#[test]
	fn picked_translation_lang_is_always_requested_or_default() {
		// §8 Invariant 5.
		let t = template(vec![("en", "Hi", "hi")], "en");
		for lang in ["en", "hu", "fr"] {
			let picked = TemplateEngine::pick_translation(&t, lang).unwrap();
			assert!(picked.lang == lang || picked.lang == t.default_language);
		}
	}

	#[test]
	fn renders_substituting_vars() {
		let engine = TemplateEngine::new();
		let mut vars = HashMap::new();
		vars.insert("name".to_string(), "Ada".to_string());
		let body = base64::engine::general_purpose::STANDARD.encode("Hello {{name}}");
		let out = engine.render("t", &body, &vars).unwrap();
		assert_eq!(out, "Hello Ada");
	}

	#[test]
	fn strict_mode_rejects_missing_variable() {
		let engine = TemplateEngine::new();
		let body = base64::engine::general_purpose::STANDARD.encode("Hello {{missing}}");
		let err = engine.render("t", &body, &HashMap::new());
		assert!(err.is_err());
	}

	#[test]
	fn empty_body_is_fatal() {
		let engine = TemplateEngine::new();
		let body = base64::engine::general_purpose::STANDARD.encode("   ");
		assert!(engine.render("t", &body, &HashMap::new()).is_err());
	}

	#[test]
	fn check_all_parsable_rejects_empty_translation_list() {
		let engine = TemplateEngine::new();
		let t = template(vec![], "en");
		assert!(engine.check_all_parsable(&t).is_err());
	}

	#[test]
	fn check_all_parsable_round_trips_with_valid_bodies() {
		// §8 Invariant 6.
		let engine = TemplateEngine::new();
		let t = template(vec![("en", "Hi", "static body, no vars")], "en");
		assert!(engine.check_all_parsable(&t).is_ok());
	}

	#[test]
	fn check_all_parsable_rejects_bad_base64() {
		let engine = TemplateEngine::new();
		let mut t = template(vec![("en", "Hi", "fine")], "en");
		t.translations[0].template_def = "not-valid-base64!!".into();
		assert!(engine.check_all_parsable(&t).is_err());
	}
}
