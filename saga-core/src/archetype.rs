//! Personality archetypes keyed by four-letter code.

use lazy_static::lazy_static;
use std::collections::HashMap;

/// A personality archetype as described to the narrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Archetype {
    pub code: &'static str,
    pub name: &'static str,
    pub title: &'static str,
    pub description: &'static str,
}

const ARCHETYPES: &[Archetype] = &[
    Archetype {
        code: "INTJ",
        name: "The Architect",
        title: "Independent, strategic thinker.",
        description: "Logical and self-reliant; treats life as a game of chess, planning ahead and probing for weaknesses. Under pressure grows colder and more calculating rather than emotional.",
    },
    Archetype {
        code: "INTP",
        name: "The Logician",
        title: "Inventive mind hungry for knowledge.",
        description: "Analytical and endlessly curious about how systems work. Lives in their own head, can seem absent-minded, and prefers dissecting a problem to forcing it.",
    },
    Archetype {
        code: "ENTJ",
        name: "The Commander",
        title: "Decisive leader who finds or makes a way.",
        description: "Born to lead: visionary, blunt and driven. Does not shy from confrontation and will reorganize anything that stands between a plan and its result.",
    },
    Archetype {
        code: "ENTP",
        name: "The Debater",
        title: "Clever provocateur who cannot resist a challenge.",
        description: "Quick-witted and irreverent, loves arguing both sides and poking holes in tradition. Improvises brilliantly, follows through less reliably.",
    },
    Archetype {
        code: "INFJ",
        name: "The Advocate",
        title: "Quiet idealist with deep convictions.",
        description: "Insightful and principled, reads people easily and acts from a private moral compass. Gentle on the surface, immovable once their values are touched.",
    },
    Archetype {
        code: "INFP",
        name: "The Mediator",
        title: "Poetic soul guided by inner values.",
        description: "Empathetic and imaginative, searches for meaning and authenticity. Avoids conflict until a cherished ideal is threatened, then becomes fiercely stubborn.",
    },
    Archetype {
        code: "ENFJ",
        name: "The Protagonist",
        title: "Charismatic mentor who inspires others.",
        description: "Warm, persuasive and protective of their people. Naturally takes responsibility for the group and can neglect their own needs while doing so.",
    },
    Archetype {
        code: "ENFP",
        name: "The Campaigner",
        title: "Enthusiastic free spirit.",
        description: "Sociable, playful and full of ideas, sees possibility everywhere. Bonds fast, bores fast, and reacts to restriction with open rebellion.",
    },
    Archetype {
        code: "ISTJ",
        name: "The Logistician",
        title: "Dependable keeper of duty and order.",
        description: "Practical, meticulous and loyal to rules and promises. Trusts proven methods over novelty and judges others by whether they keep their word.",
    },
    Archetype {
        code: "ISFJ",
        name: "The Defender",
        title: "Devoted protector of those they love.",
        description: "Kind, patient and observant of small details in other people's lives. Endures a great deal quietly, but defends loved ones without hesitation.",
    },
    Archetype {
        code: "ESTJ",
        name: "The Executive",
        title: "Organizer who enforces structure.",
        description: "Direct, efficient and confident in clear hierarchies. Values honesty and hard work and has little patience for disorder or excuses.",
    },
    Archetype {
        code: "ESFJ",
        name: "The Consul",
        title: "Caring host attentive to social harmony.",
        description: "Friendly and attentive, keeps track of everyone's place and feelings. Seeks approval and can be wounded by rejection or open disrespect.",
    },
    Archetype {
        code: "ISTP",
        name: "The Virtuoso",
        title: "Cool-headed hands-on problem solver.",
        description: "Reserved, observant and masterful with tools and techniques. Acts decisively in a crisis and dislikes explaining themselves.",
    },
    Archetype {
        code: "ISFP",
        name: "The Adventurer",
        title: "Gentle artist living in the moment.",
        description: "Sensitive, spontaneous and aesthetic, expresses feelings through deeds rather than words. Fiercely independent when cornered.",
    },
    Archetype {
        code: "ESTP",
        name: "The Entrepreneur",
        title: "Bold risk-taker who lives on the edge.",
        description: "Energetic, perceptive and impatient with theory. Thrives on danger, improvises in the moment, and enjoys testing other people's limits.",
    },
    Archetype {
        code: "ESFP",
        name: "The Entertainer",
        title: "Spontaneous performer who loves the spotlight.",
        description: "Vivacious, generous and sensual, makes every gathering livelier. Lives for the present and avoids thinking about grim consequences.",
    },
];

lazy_static! {
    static ref BY_CODE: HashMap<&'static str, &'static Archetype> =
        ARCHETYPES.iter().map(|a| (a.code, a)).collect();
}

/// Look up an archetype by code, ignoring case and surrounding whitespace.
pub fn lookup(code: &str) -> Option<&'static Archetype> {
    BY_CODE.get(code.trim().to_ascii_uppercase().as_str()).copied()
}

/// All sixteen archetypes.
pub fn all() -> &'static [Archetype] {
    ARCHETYPES
}
