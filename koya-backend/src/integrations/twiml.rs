//! TwiML builder for the inbound-call responses

use std::fmt::Write;

const VOICE: &str = "Polly.Joanna";
const LANGUAGE: &str = "en-US";

#[derive(Debug, Clone, Default)]
pub struct TwimlBuilder {
    elements: Vec<TwimlElement>,
}

#[derive(Debug, Clone)]
enum TwimlElement {
    Say { text: String },
    DialSip { uri: String, action: Option<String> },
    Record { action: String, max_length: u32, play_beep: bool },
    Pause { length: u32 },
    Redirect { url: String },
    Hangup,
}

impl TwimlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text-to-speech
    pub fn say(mut self, text: &str) -> Self {
        self.elements.push(TwimlElement::Say { text: xml_escape(text) });
        self
    }

    /// Bridge the call to a SIP endpoint; `action` is requested when the leg ends
    pub fn dial_sip(mut self, uri: &str, action: Option<&str>) -> Self {
        self.elements.push(TwimlElement::DialSip {
            uri: xml_escape(uri),
            action: action.map(xml_escape),
        });
        self
    }

    pub fn record(mut self, action: &str, max_length: u32, play_beep: bool) -> Self {
        self.elements.push(TwimlElement::Record {
            action: xml_escape(action),
            max_length,
            play_beep,
        });
        self
    }

    pub fn pause(mut self, seconds: u32) -> Self {
        self.elements.push(TwimlElement::Pause { length: seconds });
        self
    }

    pub fn redirect(mut self, url: &str) -> Self {
        self.elements.push(TwimlElement::Redirect { url: xml_escape(url) });
        self
    }

    pub fn hangup(mut self) -> Self {
        self.elements.push(TwimlElement::Hangup);
        self
    }

    pub fn build(self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response>\n");
        for element in &self.elements {
            render_element(&mut xml, element);
        }
        xml.push_str("</Response>");
        xml
    }

    /// Hand the caller to the voice agent over SIP
    pub fn bridge_to_agent(call_id: &str, sip_domain: &str, fallback_action: &str) -> String {
        TwimlBuilder::new()
            .dial_sip(&format!("sip:{}@{}", call_id, sip_domain), Some(fallback_action))
            .build()
    }

    /// Voicemail IVR used whenever the agent can't take the call
    pub fn voicemail(business_name: Option<&str>, recording_action: &str) -> String {
        let greeting = match business_name {
            Some(name) => format!(
                "Thanks for calling {}. We can't take your call right now. Please leave a message after the tone and we'll get back to you.",
                name
            ),
            None => "Thanks for calling. We can't take your call right now. Please leave a message after the tone.".to_string(),
        };
        TwimlBuilder::new()
            .say(&greeting)
            .record(recording_action, 120, true)
            .say("We didn't receive a message. Goodbye.")
            .hangup()
            .build()
    }

    /// Short acknowledgement after a voicemail is saved
    pub fn goodbye(message: &str) -> String {
        TwimlBuilder::new().say(message).pause(1).hangup().build()
    }
}

fn render_element(xml: &mut String, element: &TwimlElement) {
    match element {
        TwimlElement::Say { text } => {
            let _ = writeln!(xml, "  <Say voice=\"{}\" language=\"{}\">{}</Say>", VOICE, LANGUAGE, text);
        }
        TwimlElement::DialSip { uri, action } => {
            match action {
                Some(action) => {
                    let _ = writeln!(xml, "  <Dial action=\"{}\" method=\"POST\">", action);
                }
                None => {
                    let _ = writeln!(xml, "  <Dial>");
                }
            }
            let _ = writeln!(xml, "    <Sip>{}</Sip>", uri);
            let _ = writeln!(xml, "  </Dial>");
        }
        TwimlElement::Record {
            action,
            max_length,
            play_beep,
        } => {
            let _ = writeln!(
                xml,
                "  <Record action=\"{}\" method=\"POST\" maxLength=\"{}\" playBeep=\"{}\"/>",
                action, max_length, play_beep
            );
        }
        TwimlElement::Pause { length } => {
            let _ = writeln!(xml, "  <Pause length=\"{}\"/>", length);
        }
        TwimlElement::Redirect { url } => {
            let _ = writeln!(xml, "  <Redirect method=\"POST\">{}</Redirect>", url);
        }
        TwimlElement::Hangup => {
            let _ = writeln!(xml, "  <Hangup/>");
        }
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
