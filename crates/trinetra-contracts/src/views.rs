use std::fmt;

/// The four mutually exclusive screens of the application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum View {
    #[default]
    Chat,
    Vibecoding,
    ImageGen,
    ImageEdit,
}

impl View {
    pub const ALL: [View; 4] = [View::Chat, View::Vibecoding, View::ImageGen, View::ImageEdit];

    pub fn as_str(&self) -> &'static str {
        match self {
            View::Chat => "chat",
            View::Vibecoding => "vibecoding",
            View::ImageGen => "image_gen",
            View::ImageEdit => "image_edit",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            View::Chat => "Chat",
            View::Vibecoding => "Vibecoding",
            View::ImageGen => "Image Generation",
            View::ImageEdit => "Image Edit",
        }
    }

    pub fn parse(raw: &str) -> Option<View> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "chat" => Some(View::Chat),
            "vibecoding" | "code" => Some(View::Vibecoding),
            "image_gen" | "imagine" | "image" => Some(View::ImageGen),
            "image_edit" | "edit" => Some(View::ImageEdit),
            _ => None,
        }
    }

    /// Conversation persona for the two chat screens.
    pub fn chat_profile(&self) -> Option<&'static ChatProfile> {
        match self {
            View::Chat => Some(&CHAT_PROFILE),
            View::Vibecoding => Some(&VIBECODING_PROFILE),
            View::ImageGen | View::ImageEdit => None,
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatProfile {
    pub key: &'static str,
    pub welcome_message: &'static str,
    pub system_instruction: &'static str,
    pub placeholder: &'static str,
}

pub const CHAT_PROFILE: ChatProfile = ChatProfile {
    key: "chat",
    welcome_message:
        "हर हर महादेव! I am Trinetra, your AI assistant. How may I help you today?",
    system_instruction: "You are a helpful and friendly AI assistant named Trinetra. Your tone should be respectful and wise.",
    placeholder: "Ask Trinetra anything...",
};

pub const VIBECODING_PROFILE: ChatProfile = ChatProfile {
    key: "vibecoding",
    welcome_message: "Welcome to Vibecoding. I am your specialized coding assistant. Let's build something amazing.",
    system_instruction: "You are an expert programmer named Vibecoder. Provide clean, efficient, and well-explained code. Always format code in markdown blocks.",
    placeholder: "Describe the code you need...",
};
