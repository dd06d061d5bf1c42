//! Spoken phrasing for the receptionist
//!
//! Every failure path of a call function ends in a sentence the voice agent
//! reads to the caller. The business's personality setting picks the tone.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Personality {
    Professional,
    #[default]
    Friendly,
    Casual,
}

/// Shared situations that need a canned sentence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phrase {
    GenericError,
    AvailabilityError,
    BookingError,
    SlotTaken,
    NoAvailability,
    TransferUnavailable,
    MessageFallback,
    PaymentError,
    SmsError,
    Goodbye,
}

impl Personality {
    pub fn phrase(&self, phrase: Phrase) -> &'static str {
        use Personality::*;
        use Phrase::*;
        match (self, phrase) {
            (Professional, GenericError) => "I apologize, I'm unable to complete that request right now. May I take a message for the team?",
            (Friendly, GenericError) => "Oh, I'm having a little trouble with that right now. Want me to take a message instead?",
            (Casual, GenericError) => "Hmm, that didn't go through on my end. Want me to just take a message?",

            (Professional, AvailabilityError) => "I apologize, I'm unable to check the schedule at the moment. May I take a message so someone can follow up with you?",
            (Friendly, AvailabilityError) => "I'm having trouble checking that right now. Want me to take a message instead?",
            (Casual, AvailabilityError) => "Ugh, the calendar's not cooperating right now. Should I take a message for you?",

            (Professional, BookingError) => "I apologize, I wasn't able to complete the booking. May I take your details so the team can confirm with you directly?",
            (Friendly, BookingError) => "Shoot, I couldn't get that booked just now. Can I take your info so someone can call you back to lock it in?",
            (Casual, BookingError) => "That booking didn't go through. Want me to grab your info so they can call you back?",

            (Professional, SlotTaken) => "I'm sorry, that time is no longer available.",
            (Friendly, SlotTaken) => "Oh, it looks like that time just got taken.",
            (Casual, SlotTaken) => "Looks like someone grabbed that spot already.",

            (Professional, NoAvailability) => "I'm sorry, there are no openings in that period.",
            (Friendly, NoAvailability) => "Hmm, I'm not seeing any openings then.",
            (Casual, NoAvailability) => "Nothing open then, unfortunately.",

            (Professional, TransferUnavailable) => "I'm unable to transfer your call at the moment. May I take a message and have someone return your call?",
            (Friendly, TransferUnavailable) => "I can't connect you to someone right now, but I'd be happy to take a message so they can call you back!",
            (Casual, TransferUnavailable) => "Nobody's available to pick up right now. Want me to take a message?",

            (Professional, MessageFallback) => "May I take a message for the team?",
            (Friendly, MessageFallback) => "Would you like me to take a message instead?",
            (Casual, MessageFallback) => "Want me to just take a message?",

            (Professional, PaymentError) => "I apologize, I'm unable to process a payment right now. Someone from the team will follow up with payment details.",
            (Friendly, PaymentError) => "I'm having trouble setting up the payment right now. I'll make sure someone follows up with you about it!",
            (Casual, PaymentError) => "Payments aren't working on my end right now. Someone will reach out about it.",

            (Professional, SmsError) => "I apologize, I wasn't able to send that text message.",
            (Friendly, SmsError) => "Hmm, I couldn't send that text just now.",
            (Casual, SmsError) => "That text didn't go through.",

            (Professional, Goodbye) => "Thank you for calling. Have a good day.",
            (Friendly, Goodbye) => "Thanks so much for calling! Have a great day!",
            (Casual, Goodbye) => "Thanks for calling, take care!",
        }
    }
}
