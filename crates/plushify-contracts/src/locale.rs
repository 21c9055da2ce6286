use std::fmt;
use std::str::FromStr;

/// Display languages offered by the front end. Selection never reaches the
/// transform request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    En,
    Zh,
}

/// Header link target for the `community` label.
pub const COMMUNITY_URL: &str = "https://x.com/i/communities/2013607195569492303";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translations {
    pub title: &'static str,
    pub subtitle: &'static str,
    pub community: &'static str,
    pub upload_title: &'static str,
    pub upload_desc: &'static str,
    pub click_to_select: &'static str,
    pub result_title: &'static str,
    pub result_desc: &'static str,
    pub result_placeholder: &'static str,
    pub transform_button: &'static str,
    pub transforming: &'static str,
    pub error_upload: &'static str,
    pub error_transform: &'static str,
}

const EN: Translations = Translations {
    title: "PLUSHIFY",
    subtitle: "Transform any character into a plush toy.",
    community: "Community",
    upload_title: "Upload Character",
    upload_desc: "Pick a photo to transform.",
    click_to_select: "CLICK TO SELECT PHOTO",
    result_title: "Result",
    result_desc: "Your collectible is ready.",
    result_placeholder: "YOUR COLLECTIBLE IS READY.",
    transform_button: "Transform to Plush",
    transforming: "Stitching your plush...",
    error_upload: "Please upload an image first.",
    error_transform: "Failed to transform. Please try again.",
};

const ZH: Translations = Translations {
    title: "PLUSHIFY",
    subtitle: "将任何角色转化为毛绒玩具。",
    community: "社区",
    upload_title: "上传角色",
    upload_desc: "选择一张照片进行转化。",
    click_to_select: "点击选择照片",
    result_title: "结果",
    result_desc: "您的收藏品已准备好。",
    result_placeholder: "您的收藏品已准备就绪。",
    transform_button: "转化为毛绒玩具",
    transforming: "正在缝制您的毛绒玩具...",
    error_upload: "请先上传图片。",
    error_transform: "转换失败。请重试。",
};

impl Language {
    pub const ALL: [Language; 2] = [Language::En, Language::Zh];

    pub fn code(self) -> &'static str {
        match self {
            Language::En => "EN",
            Language::Zh => "ZH",
        }
    }

    pub fn strings(self) -> &'static Translations {
        match self {
            Language::En => &EN,
            Language::Zh => &ZH,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Language::En),
            "zh" | "cn" | "chinese" | "中文" => Ok(Language::Zh),
            other => Err(format!("unsupported language '{other}' (expected en or zh)")),
        }
    }
}
