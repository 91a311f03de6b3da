use crate::scoring::RiskLabel;

/// Advice shown next to a label, in English and Hindi.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hints {
    pub en: &'static str,
    pub hi: &'static str,
}

pub fn hints_for(label: RiskLabel) -> Hints {
    match label {
        RiskLabel::Low => Hints {
            en: "No strong fraud indicators were found. Stay cautious with unexpected requests.",
            hi: "कोई गंभीर धोखाधड़ी संकेत नहीं मिला। अनपेक्षित अनुरोधों से सावधान रहें।",
        },
        RiskLabel::Medium => Hints {
            en: "Some warning signs were found. Verify the sender through an official channel before acting.",
            hi: "कुछ चेतावनी संकेत मिले हैं। कोई भी कदम उठाने से पहले आधिकारिक माध्यम से प्रेषक की पुष्टि करें।",
        },
        RiskLabel::High => Hints {
            en: "Strong fraud indicators were found. Do not share OTPs, passwords or payment details.",
            hi: "धोखाधड़ी के मज़बूत संकेत मिले हैं। OTP, पासवर्ड या भुगतान विवरण साझा न करें।",
        },
    }
}
