//! Built-in conversation presets
//!
//! A preset seeds a fresh session: chat history, remote attachments, a
//! system instruction and a suggested first prompt.

use crate::attachments::Attachment;
use crate::session::SeedMessage;

/// Sample data lives under this bucket
const SAMPLES: &str = "https://storage.googleapis.com/cloud-samples-data/generative-ai";

/// Starting state for a session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Preset {
    /// Lookup key, e.g. `travel-tips`
    pub name: String,
    /// Title shown by the front end
    pub title: String,
    /// One-line description
    pub description: String,
    /// Model override
    pub model: Option<String>,
    /// System instruction override
    pub system_instruction: Option<String>,
    /// Suggested first prompt
    pub initial_prompt: Option<String>,
    /// Prior turns
    pub history: Vec<SeedMessage>,
    /// Remote files queued for the first message
    pub attachments: Vec<Attachment>,
}

impl Preset {
    fn new(name: &str, title: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            model: None,
            system_instruction: None,
            initial_prompt: None,
            history: Vec::new(),
            attachments: Vec::new(),
        }
    }

    fn system(mut self, text: &str) -> Self {
        self.system_instruction = Some(text.to_string());
        self
    }

    fn prompt(mut self, text: &str) -> Self {
        self.initial_prompt = Some(text.to_string());
        self
    }

    fn history(mut self, history: Vec<SeedMessage>) -> Self {
        self.history = history;
        self
    }

    fn file(mut self, path: &str, mime_type: &str) -> Self {
        self.attachments
            .push(Attachment::from_url(format!("{SAMPLES}/{path}"), mime_type));
        self
    }
}

/// All built-in presets
#[must_use]
pub fn builtin_presets() -> Vec<Preset> {
    vec![
        Preset::new(
            "travel-tips",
            "Travel tips",
            "Help a new traveler with travel tips",
        )
        .history(vec![
            SeedMessage::user("I have never traveled before. When should I book a flight?"),
            SeedMessage::assistant(
                "You should book flights a couple of months ahead of time. \
                 It will be cheaper and more flexible for you.",
            ),
            SeedMessage::user("Do I need a passport?"),
            SeedMessage::assistant(
                "If you are traveling outside your own country, make sure your passport \
                 is up-to-date and valid for more than 6 months during your travel.",
            ),
        ])
        .prompt("What else is important when traveling?")
        .system(
            "You are a Travel assistant. You will answer questions the user asks based on \
             the information listed in Relevant Information. Do not hallucinate. Do not use \
             the internet.",
        ),
        Preset::new(
            "course-chatbot",
            "Chatbot recommendations for courses",
            "Suggest courses for a performing arts program",
        )
        .prompt("I am interested in Performing Arts. I have taken Theater 1A.")
        .system(
            "You are a chatbot for the county's performing and fine arts program. You help \
             students decide what course they will take during the summer.",
        ),
        Preset::new(
            "blog-post",
            "Blog post creator",
            "Create a blog post from an image file stored in Cloud Storage",
        )
        .prompt(
            "Write a short, engaging blog post based on this picture. It should include a \
             description of the meal in the photo and talk about my journey meal prepping.",
        )
        .file("image/meal-prep.jpeg", "image/jpeg"),
        Preset::new(
            "video-hashtags",
            "Hashtags for a video",
            "Generate hashtags for a video ad stored in Cloud Storage",
        )
        .prompt(
            "Generate 5-10 hashtags that relate to the video content. Try to use more popular \
             and engaging terms, e.g. #Viral. Do not add content not related to the video.\n \
             Start the output with 'Tags:'",
        )
        .file("video/google_home_celebrity_ad.mp4", "video/mp4"),
        Preset::new(
            "summarize-video",
            "Summarize video",
            "Summarize a video and extract important dialogue",
        )
        .history(vec![
            SeedMessage::user("Can you help me with the description of a video file?"),
            SeedMessage::assistant(
                "Sure! Click on the attach button below and choose a video file for me to describe.",
            ),
        ])
        .prompt(
            "I have attached the video file. Provide a description of the video. The \
             description should also contain anything important which people say in the video.",
        ),
        Preset::new(
            "audio-translation",
            "Translation from audio",
            "Translate an audio file stored in Cloud Storage",
        )
        .prompt("Please translate the audio in Mandarin.")
        .file("audio/How_to_create_a_My_Map_in_Google_Maps.mp3", "audio/mp3"),
        Preset::new(
            "document-comparison",
            "Document comparison",
            "Compare the contents of 2 documents stored in Cloud Storage",
        )
        .prompt(
            "The first document is from 2013, and the second document is from 2023. How did \
             the standard deduction evolve?",
        )
        .file("pdf/form_1040_2013.pdf", "application/pdf")
        .file("pdf/form_1040_2023.pdf", "application/pdf"),
    ]
}

/// Look up a built-in preset by name
#[must_use]
pub fn find_preset(name: &str) -> Option<Preset> {
    builtin_presets().into_iter().find(|p| p.name == name)
}
