//! Static product content: the companion's system instruction, canned
//! conversation texts, the exercise catalog and the crisis-line directory.

use serde::Serialize;

pub const SYSTEM_PROMPT: &str = "\
You are MINDA, a compassionate, non-judgmental mental health companion specifically designed for users in India. \n\
Your goal is to provide emotional support, listen actively, and suggest evidence-based coping strategies (CBT, DBT, Mindfulness).\n\
\n\
CULTURAL CONTEXT (INDIA):\n\
- Acknowledge that mental health is often viewed through the lens of family, community, and social expectations.\n\
- Be sensitive to topics like academic pressure, family dynamics, and workplace stress in the Indian context.\n\
- Use empathetic, respectful language.\n\
\n\
CRITICAL SAFETY RULES:\n\
1. You are NOT a doctor or a licensed therapist.\n\
2. If the user mentions self-harm, suicide, or harming others, you MUST provide crisis resources immediately (e.g., Tele MANAS 14416) and urge them to contact emergency services.\n\
3. Keep responses empathetic, concise, and focused on the user's emotional well-being.\n\
4. Do not provide medical diagnoses or prescribe medication.\n\
5. Use \"I hear you,\" \"That sounds difficult,\" and other validation techniques.";

/// Fallback display name before the user has introduced themselves.
pub const DEFAULT_USER_NAME: &str = "Friend";

/// Permanent transcript entry appended when a send fails for any
/// non-credential reason.
pub const APOLOGY: &str =
    "I'm having a little trouble connecting. Please check your internet or try refreshing.";

/// Fixed prompt issued by the clinic finder with the caller's coordinates as
/// retrieval bias.
pub const CLINIC_SEARCH_PROMPT: &str = "Find 5 licensed mental health clinics, therapists, or \
     psychiatrists near my current location. Provide their names, addresses, and a brief \
     description of their services.";

pub const SHARE_TITLE: &str = "MINDA - Mental Health Companion";
pub const SHARE_TEXT: &str = "I found this helpful mental health companion called MINDA. It \
     offers AI-powered support, mood tracking, and mindfulness exercises.";
pub const SHARE_URL: &str = "https://minda.app/";

pub fn greeting(user_name: &str) -> String {
    format!(
        "Hello {user_name}. I'm MINDA. I'm here to listen, support, and help you navigate your \
         feelings. How are you doing in this moment?"
    )
}

/// Greeting shown after the conversation is cleared.
pub fn clear_greeting(user_name: &str) -> String {
    format!("Hello again {user_name}. How can I support you right now?")
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ExerciseInfo {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub duration: &'static str,
    pub category: &'static str,
    pub instructions: &'static [&'static str],
}

pub const EXERCISES: &[ExerciseInfo] = &[
    ExerciseInfo {
        id: "box-breathing",
        title: "Box Breathing",
        description: "A powerful technique used to calm the nervous system and regain focus.",
        duration: "4 mins",
        category: "Breathing",
        instructions: &[
            "Inhale slowly for 4 seconds.",
            "Hold your breath for 4 seconds.",
            "Exhale slowly for 4 seconds.",
            "Hold empty for 4 seconds.",
            "Repeat 4 times.",
        ],
    },
    ExerciseInfo {
        id: "54321-grounding",
        title: "5-4-3-2-1 Grounding",
        description: "Use your senses to pull yourself out of a panic attack or high anxiety.",
        duration: "5 mins",
        category: "Grounding",
        instructions: &[
            "Name 5 things you can SEE.",
            "Name 4 things you can TOUCH.",
            "Name 3 things you can HEAR.",
            "Name 2 things you can SMELL.",
            "Name 1 thing you can TASTE.",
        ],
    },
    ExerciseInfo {
        id: "daily-gratitude",
        title: "Daily Reflection",
        description: "Identify small moments of peace or gratitude in your day.",
        duration: "Unlimited",
        category: "Reflection",
        instructions: &[
            "What is one small thing that went well today?",
            "Who is someone you are grateful for?",
            "What is one thing you did to take care of yourself today?",
        ],
    },
];

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CrisisResource {
    pub name: &'static str,
    pub contact: &'static str,
    pub link: &'static str,
}

pub const CRISIS_RESOURCES: &[CrisisResource] = &[
    CrisisResource {
        name: "Tele MANAS (24/7 National)",
        contact: "14416 / 1-800-891-4416",
        link: "https://telemanas.mohfw.gov.in/",
    },
    CrisisResource {
        name: "Vandrevala Foundation",
        contact: "+91 91529 87821",
        link: "https://www.vandrevalafoundation.com/",
    },
    CrisisResource {
        name: "AASRA (24/7 Helpline)",
        contact: "+91 98204 66726",
        link: "http://www.aasra.info/",
    },
    CrisisResource {
        name: "iCall (TISS Helpline)",
        contact: "9152987821",
        link: "https://icallhelpline.org/",
    },
    CrisisResource {
        name: "Kiran Mental Health Helpline",
        contact: "1800-599-0019",
        link: "https://pib.gov.in/PressReleasePage.aspx?PRID=1652071",
    },
];
