//! Spoken phrasing for guided sessions, per locale.
//!
//! Bundles are static tables. Templates use `{name}`, `{count}`, `{n}`, `{total}`
//! and `{seconds}` placeholders. Random choices take the caller's RNG so a seeded
//! session always says the same thing.

use rand::seq::SliceRandom;
use rand::Rng;

/// Phrase templates for one language.
#[derive(Debug)]
pub struct ScriptBundle {
    /// Primary language subtag (e.g. "en").
    pub language: &'static str,
    intros: &'static [&'static str],
    next_step: &'static str,
    hold_for: &'static str,
    hold_for_one: &'static str,
    /// Spoken when a hold countdown reaches zero.
    pub release: &'static str,
    encouragements: &'static [&'static str],
    /// Spoken once when the final step is done.
    pub exercise_complete: &'static str,
    /// Spoken before re-running the current step.
    pub repeat_step: &'static str,
}

static EN: ScriptBundle = ScriptBundle {
    language: "en",
    intros: &[
        "Let's start {name}. There are {count} steps. Get your dog ready.",
        "Time for {name}! We'll go through {count} steps together.",
        "Ready for {name}? {count} steps ahead. Let's go!",
        "Okay, let's train {name}. We have {count} steps.",
    ],
    next_step: "Step {n} of {total}.",
    hold_for: "Hold for {seconds} seconds.",
    hold_for_one: "Hold for one second.",
    release: "And release! Good job.",
    encouragements: &[
        "Great job!",
        "Your dog is doing wonderfully.",
        "Keep it up!",
        "Nice work, stay consistent.",
        "Remember to reward good behavior.",
        "You're a great team!",
        "Stay calm and patient, you've got this.",
    ],
    exercise_complete: "Exercise complete! Great work today. Give your dog a big reward.",
    repeat_step: "Let's repeat that step.",
};

static DE: ScriptBundle = ScriptBundle {
    language: "de",
    intros: &[
        "Los geht's mit {name}. Es gibt {count} Schritte. Mach deinen Hund bereit.",
        "Zeit für {name}! Wir gehen {count} Schritte gemeinsam durch.",
        "Bereit für {name}? {count} Schritte liegen vor uns. Los geht's!",
        "Okay, wir trainieren {name}. Wir haben {count} Schritte.",
    ],
    next_step: "Schritt {n} von {total}.",
    hold_for: "Halte {seconds} Sekunden.",
    hold_for_one: "Halte eine Sekunde.",
    release: "Und auflösen! Gut gemacht.",
    encouragements: &[
        "Super gemacht!",
        "Dein Hund macht das toll.",
        "Weiter so!",
        "Schöne Arbeit, bleib dran.",
        "Denk daran, gutes Verhalten zu belohnen.",
        "Ihr seid ein tolles Team!",
    ],
    exercise_complete: "Übung abgeschlossen! Tolle Arbeit heute. Gib deinem Hund eine große Belohnung.",
    repeat_step: "Wiederholen wir diesen Schritt.",
};

static ES: ScriptBundle = ScriptBundle {
    language: "es",
    intros: &[
        "Empecemos con {name}. Hay {count} pasos. Prepara a tu perro.",
        "¡Es hora de {name}! Haremos {count} pasos juntos.",
        "¿Listos para {name}? Tenemos {count} pasos por delante. ¡Vamos!",
    ],
    next_step: "Paso {n} de {total}.",
    hold_for: "Mantén durante {seconds} segundos.",
    hold_for_one: "Mantén durante un segundo.",
    release: "¡Y libera! Buen trabajo.",
    encouragements: &[
        "¡Muy bien hecho!",
        "Tu perro lo está haciendo genial.",
        "¡Sigue así!",
        "Buen trabajo, sé constante.",
        "Recuerda premiar el buen comportamiento.",
        "¡Forman un gran equipo!",
    ],
    exercise_complete: "¡Ejercicio completado! Gran trabajo hoy. Dale a tu perro un buen premio.",
    repeat_step: "Repitamos ese paso.",
};

static BUNDLES: [&ScriptBundle; 3] = [&EN, &DE, &ES];

/// Bundle used when the requested locale has none.
pub const DEFAULT_LANGUAGE: &str = "en";

impl ScriptBundle {
    /// Look up the bundle for a locale tag such as `"de"`, `"de-DE"` or `"es_MX"`.
    /// Unknown locales get the English bundle.
    pub fn for_locale(locale: &str) -> &'static ScriptBundle {
        let language = language_of(locale);
        BUNDLES
            .iter()
            .copied()
            .find(|b| b.language == language)
            .unwrap_or(&EN)
    }

    /// Opening line, picked uniformly from the intro pool.
    pub fn intro<R: Rng + ?Sized>(&self, rng: &mut R, exercise_name: &str, step_count: usize) -> String {
        let template = self.intros.choose(rng).copied().unwrap_or(self.intros[0]);
        template
            .replace("{name}", exercise_name)
            .replace("{count}", &step_count.to_string())
    }

    /// "Step n of total", with `n` 1-based.
    pub fn next_step(&self, n: usize, total: usize) -> String {
        self.next_step
            .replace("{n}", &n.to_string())
            .replace("{total}", &total.to_string())
    }

    pub fn hold_for(&self, seconds: u32) -> String {
        if seconds == 1 {
            self.hold_for_one.to_string()
        } else {
            self.hold_for.replace("{seconds}", &seconds.to_string())
        }
    }

    pub fn encouragement<R: Rng + ?Sized>(&self, rng: &mut R) -> &'static str {
        self.encouragements
            .choose(rng)
            .copied()
            .unwrap_or(self.encouragements[0])
    }

    pub fn intro_templates(&self) -> &'static [&'static str] {
        self.intros
    }

    pub fn encouragements(&self) -> &'static [&'static str] {
        self.encouragements
    }
}

fn language_of(locale: &str) -> String {
    locale
        .split(['-', '_'])
        .next()
        .unwrap_or(DEFAULT_LANGUAGE)
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn locale_lookup_and_fallback() {
        assert_eq!(ScriptBundle::for_locale("de-DE").language, "de");
        assert_eq!(ScriptBundle::for_locale("es_MX").language, "es");
        assert_eq!(ScriptBundle::for_locale("EN").language, "en");
        assert_eq!(ScriptBundle::for_locale("ja-JP").language, DEFAULT_LANGUAGE);
        assert_eq!(ScriptBundle::for_locale("").language, DEFAULT_LANGUAGE);
    }

    #[test]
    fn pools_are_large_enough() {
        for bundle in BUNDLES {
            assert!(bundle.intro_templates().len() >= 3, "{}", bundle.language);
            assert!(bundle.encouragements().len() >= 6, "{}", bundle.language);
        }
    }

    #[test]
    fn intro_fills_placeholders() {
        let mut rng = StdRng::seed_from_u64(1);
        let line = EN.intro(&mut rng, "Sit & Stay", 4);
        assert!(line.contains("Sit & Stay"));
        assert!(line.contains('4'));
        assert!(!line.contains('{'));
    }

    #[test]
    fn intro_is_deterministic_for_a_seed() {
        let a: Vec<String> = {
            let mut rng = StdRng::seed_from_u64(42);
            (0..5).map(|_| EN.intro(&mut rng, "Recall", 3)).collect()
        };
        let b: Vec<String> = {
            let mut rng = StdRng::seed_from_u64(42);
            (0..5).map(|_| EN.intro(&mut rng, "Recall", 3)).collect()
        };
        assert_eq!(a, b);
    }

    #[test]
    fn intro_varies_across_calls() {
        let mut rng = StdRng::seed_from_u64(7);
        let seen: HashSet<String> = (0..50).map(|_| EN.intro(&mut rng, "Down", 2)).collect();
        assert!(seen.len() > 1);
    }

    #[test]
    fn step_and_hold_phrases() {
        assert_eq!(EN.next_step(2, 5), "Step 2 of 5.");
        assert_eq!(EN.hold_for(5), "Hold for 5 seconds.");
        assert_eq!(EN.hold_for(1), "Hold for one second.");
        assert_eq!(DE.next_step(1, 3), "Schritt 1 von 3.");
        assert_eq!(ES.hold_for(10), "Mantén durante 10 segundos.");
    }

    #[test]
    fn encouragement_comes_from_pool() {
        let mut rng = StdRng::seed_from_u64(3);
        let line = DE.encouragement(&mut rng);
        assert!(DE.encouragements().contains(&line));
    }
}
